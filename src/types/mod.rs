use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable identifier of a symbol.
///
/// Derived from the owning file, the declaration position and the symbol name,
/// so the same declaration re-ingested from an unchanged file keeps its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(Arc<str>);

/// URI of a source file as handed over by the document layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileUri(Arc<str>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Class,
    Interface,
    Enum,
    Trigger,
    Method,
    Constructor,
    Field,
    Property,
    Variable,
    Parameter,
    EnumValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Default,
    Private,
    Protected,
    Public,
    Global,
}

/// Declaration modifiers and annotations attached to a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_webservice: bool,
    pub is_test_method: bool,
    /// Raw annotation text as written, e.g. `@Deprecated` or `@InvocableMethod(label='x')`.
    pub annotations: Vec<String>,
}

impl SymbolId {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Build the stable id for a declaration.
    pub fn derive(file_uri: &FileUri, location: &Range, name: &str) -> Self {
        Self(
            format!(
                "{}:{}:{}:{}",
                file_uri.as_str(),
                location.start_line,
                location.start_column,
                name
            )
            .into(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FileUri {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FileUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileUri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Range {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Zero-width range at a single position.
    pub fn at(line: u32, column: u32) -> Self {
        Self::new(line, column, line, column)
    }

    pub fn start(&self) -> Position {
        Position::new(self.start_line, self.start_column)
    }

    pub fn contains(&self, line: u32, column: u32) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }

        if line == self.start_line && column < self.start_column {
            return false;
        }

        if line == self.end_line && column > self.end_column {
            return false;
        }

        true
    }

    pub fn contains_position(&self, position: Position) -> bool {
        self.contains(position.line, position.column)
    }
}

impl SymbolKind {
    /// Kinds that declare a type usable in type references.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Constructor)
    }

    /// Kinds that can shadow a type name inside a method body.
    pub fn is_local(&self) -> bool {
        matches!(self, SymbolKind::Variable | SymbolKind::Parameter)
    }
}

impl Modifiers {
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    /// Whether any annotation is `@Deprecated`, ignoring case and parameters.
    pub fn is_deprecated(&self) -> bool {
        self.annotations.iter().any(|a| {
            let bare = a.trim().trim_start_matches('@');
            let name = bare.split('(').next().unwrap_or(bare).trim();
            name.eq_ignore_ascii_case("deprecated")
        })
    }

    pub fn is_global(&self) -> bool {
        self.visibility == Visibility::Global
    }
}
