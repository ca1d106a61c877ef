use super::Symbol;
use crate::relationship::ReferenceType;
use crate::types::{FileUri, Position, Range, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};

/// Syntactic position a reference was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceContext {
    TypeDeclaration,
    ParameterType,
    ReturnType,
    ConstructorCall,
    CastType,
    InstanceofType,
    GenericParameterType,
    MethodCall,
    FieldAccess,
    ClassReference,
    Extends,
    Implements,
    VariableUsage,
}

impl ReferenceContext {
    /// Contexts in which the referenced name must denote a type.
    pub fn is_type_context(&self) -> bool {
        matches!(
            self,
            ReferenceContext::TypeDeclaration
                | ReferenceContext::ParameterType
                | ReferenceContext::ReturnType
                | ReferenceContext::ConstructorCall
                | ReferenceContext::CastType
                | ReferenceContext::InstanceofType
                | ReferenceContext::GenericParameterType
        )
    }

    /// Graph edge type produced when this reference resolves, if any.
    ///
    /// Plain variable usages stay file-local and never become edges.
    pub fn reference_type(&self) -> Option<ReferenceType> {
        match self {
            ReferenceContext::MethodCall => Some(ReferenceType::MethodCall),
            ReferenceContext::FieldAccess => Some(ReferenceType::FieldAccess),
            ReferenceContext::ConstructorCall => Some(ReferenceType::ConstructorCall),
            ReferenceContext::ClassReference => Some(ReferenceType::StaticAccess),
            ReferenceContext::Extends => Some(ReferenceType::Inheritance),
            ReferenceContext::Implements => Some(ReferenceType::InterfaceImplementation),
            ReferenceContext::VariableUsage => None,
            ReferenceContext::TypeDeclaration
            | ReferenceContext::ParameterType
            | ReferenceContext::ReturnType
            | ReferenceContext::CastType
            | ReferenceContext::InstanceofType
            | ReferenceContext::GenericParameterType => Some(ReferenceType::TypeReference),
        }
    }
}

/// A name use recorded by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolReference {
    pub name: String,
    pub context: ReferenceContext,
    pub location: Range,
    /// Receiver or namespace written before the name (`Foo` in `Foo.bar()`).
    pub qualifier: Option<String>,
    /// Innermost declaration containing the reference.
    pub enclosing_symbol_id: Option<SymbolId>,
    /// Position of the argument when the reference sits in a call argument list.
    pub parameter_index: Option<u32>,
    pub resolved_symbol_id: Option<SymbolId>,
}

impl SymbolReference {
    pub fn new(name: impl Into<String>, context: ReferenceContext, location: Range) -> Self {
        Self {
            name: name.into(),
            context,
            location,
            qualifier: None,
            enclosing_symbol_id: None,
            parameter_index: None,
            resolved_symbol_id: None,
        }
    }

    pub fn within(mut self, enclosing: &SymbolId) -> Self {
        self.enclosing_symbol_id = Some(enclosing.clone());
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn with_parameter_index(mut self, index: u32) -> Self {
        self.parameter_index = Some(index);
        self
    }
}

/// Per-file output of the parser: symbols in declaration order plus references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    file_uri: Option<FileUri>,
    symbols: Vec<Symbol>,
    references: Vec<SymbolReference>,
}

impl SymbolTable {
    pub fn new(file_uri: FileUri) -> Self {
        Self {
            file_uri: Some(file_uri),
            symbols: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn file_uri(&self) -> Option<&FileUri> {
        self.file_uri.as_ref()
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = symbol.id.clone();
        self.symbols.push(symbol);
        id
    }

    pub fn add_reference(&mut self, reference: SymbolReference) {
        self.references.push(reference);
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn references(&self) -> &[SymbolReference] {
        &self.references
    }

    pub fn get(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.iter().find(|s| &s.id == id)
    }

    /// All symbols with the given name, ignoring case, in declaration order.
    pub fn lookup(&self, name: &str) -> Vec<&Symbol> {
        self.symbols.iter().filter(|s| s.is_named(name)).collect()
    }

    /// Type declarations (class, interface, enum) named `name`.
    pub fn lookup_type(&self, name: &str) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.kind.is_type() && s.is_named(name))
    }

    pub fn children_of<'a>(&'a self, parent: &'a SymbolId) -> impl Iterator<Item = &'a Symbol> + Clone {
        self.symbols
            .iter()
            .filter(move |s| s.parent_id.as_ref() == Some(parent))
    }

    pub fn symbols_of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(move |s| s.kind == kind)
    }

    /// Innermost symbol whose declaration range contains `position`.
    pub fn symbol_at(&self, position: Position) -> Option<&Symbol> {
        self.symbols
            .iter()
            .filter(|s| s.location.contains_position(position))
            .min_by_key(|s| span_size(&s.location))
    }

    /// References whose range contains `position`, innermost first.
    pub fn references_at(&self, position: Position) -> Vec<&SymbolReference> {
        let mut found: Vec<&SymbolReference> = self
            .references
            .iter()
            .filter(|r| r.location.contains_position(position))
            .collect();
        found.sort_by_key(|r| span_size(&r.location));
        found
    }

    /// Walk the parent chain starting at `id` (inclusive).
    pub fn ancestors(&self, id: &SymbolId) -> Vec<&Symbol> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(symbol) = current {
            chain.push(symbol);
            current = symbol.parent_id.as_ref().and_then(|p| self.get(p));
            if chain.len() > self.symbols.len() {
                break;
            }
        }
        chain
    }

    /// Nearest enclosing type declaration of `id` (inclusive).
    pub fn enclosing_type(&self, id: &SymbolId) -> Option<&Symbol> {
        self.ancestors(id).into_iter().find(|s| s.kind.is_type())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn span_size(range: &Range) -> (u32, u32) {
    let lines = range.end_line.saturating_sub(range.start_line);
    let columns = if lines == 0 {
        range.end_column.saturating_sub(range.start_column)
    } else {
        range.end_column
    };
    (lines, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolTable {
        let uri = FileUri::new("file:///Foo.cls");
        let mut table = SymbolTable::new(uri.clone());
        let class = Symbol::new(SymbolKind::Class, "Foo", uri.clone(), Range::new(0, 0, 10, 1));
        let class_id = table.add_symbol(class);
        let method = Symbol::new(SymbolKind::Method, "bar", uri.clone(), Range::new(2, 4, 5, 5))
            .with_parent(&class_id);
        let method_id = table.add_symbol(method);
        table.add_reference(
            SymbolReference::new("Account", ReferenceContext::TypeDeclaration, Range::new(3, 8, 3, 15))
                .within(&method_id),
        );
        table
    }

    #[test]
    fn test_symbol_at_returns_innermost() {
        let table = sample();

        assert_eq!(table.symbol_at(Position::new(3, 10)).map(|s| s.name.as_str()), Some("bar"));
        assert_eq!(table.symbol_at(Position::new(8, 0)).map(|s| s.name.as_str()), Some("Foo"));
        assert!(table.symbol_at(Position::new(12, 0)).is_none());
    }

    #[test]
    fn test_references_at_position() {
        let table = sample();

        let refs = table.references_at(Position::new(3, 9));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "Account");
        assert!(table.references_at(Position::new(4, 0)).is_empty());
    }

    #[test]
    fn test_enclosing_type_walks_parents() {
        let table = sample();
        let method = table.lookup("BAR")[0];

        assert_eq!(table.enclosing_type(&method.id).map(|s| s.name.as_str()), Some("Foo"));
    }
}
