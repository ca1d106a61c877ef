//! Symbols as produced by the parser-facing ingestion step.
//!
//! A [`Symbol`] is immutable after ingestion except for resolution metadata
//! (`resolved_symbol_id`). The per-file [`SymbolTable`] is the unit handed over
//! by the parser: ordered symbols plus every reference seen while parsing.

mod table;
mod type_ref;

pub use table::{ReferenceContext, SymbolReference, SymbolTable};
pub use type_ref::TypeReference;

use crate::types::{FileUri, Modifiers, Range, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};

/// A declared parameter of a method or constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_ref: TypeReference,
}

/// Literal kinds recognised on the right-hand side of an initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralKind {
    Integer,
    Long,
    Decimal,
    String,
    Boolean,
    Null,
}

/// Minimal shape of an initializer expression, enough to infer its static type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initializer {
    Literal(LiteralKind),
    New(TypeReference),
    Identifier(String),
    MethodCall {
        receiver: Option<Box<Initializer>>,
        name: String,
    },
    FieldAccess {
        receiver: Box<Initializer>,
        name: String,
    },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub name: String,
    pub fqn: Option<String>,
    pub location: Range,
    pub modifiers: Modifiers,
    pub file_uri: FileUri,
    pub parent_id: Option<SymbolId>,
    /// Namespace prefix of the owning package, if any.
    pub namespace: Option<String>,
    /// Declared type for fields/variables/properties, return type for methods.
    pub type_ref: Option<TypeReference>,
    pub parameters: Vec<Parameter>,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub initializer: Option<Initializer>,
    /// Range of the initializer expression, used to tell a declaration apart
    /// from expressions nested in its own initializer.
    pub initializer_range: Option<Range>,
    pub resolved_symbol_id: Option<SymbolId>,
}

impl Symbol {
    /// Create a symbol with an id derived from file, position and name.
    pub fn new(
        kind: SymbolKind,
        name: impl Into<String>,
        file_uri: FileUri,
        location: Range,
    ) -> Self {
        let name = name.into();
        Self {
            id: SymbolId::derive(&file_uri, &location, &name),
            kind,
            name,
            fqn: None,
            location,
            modifiers: Modifiers::default(),
            file_uri,
            parent_id: None,
            namespace: None,
            type_ref: None,
            parameters: Vec::new(),
            super_class: None,
            interfaces: Vec::new(),
            initializer: None,
            initializer_range: None,
            resolved_symbol_id: None,
        }
    }

    pub fn with_parent(mut self, parent: &SymbolId) -> Self {
        self.parent_id = Some(parent.clone());
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_type(mut self, type_ref: TypeReference) -> Self {
        self.type_ref = Some(type_ref);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, type_ref: TypeReference) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            type_ref,
        });
        self
    }

    pub fn with_super_class(mut self, super_class: impl Into<String>) -> Self {
        self.super_class = Some(super_class.into());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_initializer(mut self, initializer: Initializer, range: Range) -> Self {
        self.initializer = Some(initializer);
        self.initializer_range = Some(range);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_fqn(mut self, fqn: impl Into<String>) -> Self {
        self.fqn = Some(fqn.into());
        self
    }

    /// Whether `name` matches this symbol, ignoring case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Method signature used for duplicate detection: lower-cased name and
    /// parameter types, e.g. `bar(string,list<integer>)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| p.type_ref.display().to_lowercase())
            .collect();
        format!("{}({})", self.name.to_lowercase(), params.join(","))
    }
}

/// Lightweight snapshot of a symbol carried by deferred references.
///
/// `file_uri` may be missing when the reference was recorded before the
/// source was attached to a file; it is backfilled lazily on first lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    pub id: SymbolId,
    pub name: String,
    pub file_uri: Option<FileUri>,
}

impl From<&Symbol> for SymbolRef {
    fn from(symbol: &Symbol) -> Self {
        Self {
            id: symbol.id.clone(),
            name: symbol.name.clone(),
            file_uri: Some(symbol.file_uri.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_ignores_case_and_parameter_names() {
        let uri = FileUri::new("file:///Foo.cls");
        let a = Symbol::new(SymbolKind::Method, "Bar", uri.clone(), Range::at(1, 4))
            .with_parameter("x", TypeReference::parse("String"))
            .with_parameter("ys", TypeReference::parse("List<Integer>"));
        let b = Symbol::new(SymbolKind::Method, "bar", uri, Range::at(2, 4))
            .with_parameter("other", TypeReference::parse("string"))
            .with_parameter("zs", TypeReference::parse("list<integer>"));

        assert_eq!(a.signature(), "bar(string,list<integer>)");
        assert_eq!(a.signature(), b.signature());
    }
}
