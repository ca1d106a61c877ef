//! Typed reference edges between symbols.

use crate::types::{FileUri, Range};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    MethodCall,
    FieldAccess,
    TypeReference,
    Inheritance,
    InterfaceImplementation,
    ConstructorCall,
    StaticAccess,
    ImportReference,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::MethodCall => "method-call",
            ReferenceType::FieldAccess => "field-access",
            ReferenceType::TypeReference => "type-reference",
            ReferenceType::Inheritance => "inheritance",
            ReferenceType::InterfaceImplementation => "interface-implementation",
            ReferenceType::ConstructorCall => "constructor-call",
            ReferenceType::StaticAccess => "static-access",
            ReferenceType::ImportReference => "import-reference",
        }
    }

    /// Whether a target of the given kind can satisfy this reference.
    ///
    /// Used to pick the right candidate when several symbols share a name
    /// (a class `Foo` and a method `foo`, for instance).
    pub fn accepts(&self, kind: crate::types::SymbolKind) -> bool {
        use crate::types::SymbolKind;
        match self {
            ReferenceType::MethodCall => kind.is_callable(),
            ReferenceType::FieldAccess => matches!(
                kind,
                SymbolKind::Field | SymbolKind::Property | SymbolKind::EnumValue
            ),
            ReferenceType::TypeReference
            | ReferenceType::ConstructorCall
            | ReferenceType::StaticAccess
            | ReferenceType::ImportReference => kind.is_type(),
            ReferenceType::Inheritance => kind == SymbolKind::Class,
            ReferenceType::InterfaceImplementation => kind == SymbolKind::Interface,
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call-site details kept on an edge for navigation and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSiteContext {
    pub method_name: Option<String>,
    pub parameter_index: Option<u32>,
    pub is_static: bool,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub reference_type: ReferenceType,
    pub source_file_uri: FileUri,
    pub target_file_uri: FileUri,
    /// Where the reference occurs in the source file.
    pub location: Range,
    pub context: Option<CallSiteContext>,
}

impl ReferenceEdge {
    pub fn new(
        reference_type: ReferenceType,
        source_file_uri: FileUri,
        target_file_uri: FileUri,
        location: Range,
    ) -> Self {
        Self {
            reference_type,
            source_file_uri,
            target_file_uri,
            location,
            context: None,
        }
    }

    pub fn with_context(mut self, context: CallSiteContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_cross_file(&self) -> bool {
        self.source_file_uri != self.target_file_uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    #[test]
    fn test_reference_type_accepts_matching_kinds() {
        assert!(ReferenceType::MethodCall.accepts(SymbolKind::Method));
        assert!(!ReferenceType::MethodCall.accepts(SymbolKind::Class));
        assert!(ReferenceType::TypeReference.accepts(SymbolKind::Interface));
        assert!(ReferenceType::InterfaceImplementation.accepts(SymbolKind::Interface));
        assert!(!ReferenceType::Inheritance.accepts(SymbolKind::Interface));
        assert!(ReferenceType::FieldAccess.accepts(SymbolKind::Property));
    }

    #[test]
    fn test_cross_file_edge() {
        let edge = ReferenceEdge::new(
            ReferenceType::MethodCall,
            FileUri::new("file:///A.cls"),
            FileUri::new("file:///B.cls"),
            Range::at(1, 1),
        );

        assert!(edge.is_cross_file());
        assert_eq!(edge.reference_type.to_string(), "method-call");
    }
}
