//! Symbol types - what symbol providers hand back
//!
//! Providers answer two shapes of symbol:
//! - `Located`: a flat entry with a file identity (workspace search results,
//!   flat document symbol lists)
//! - `Outline`: a hierarchical document-outline entry that only carries a
//!   range inside an implied document

use crate::location::{Location, Position};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Symbol kinds relevant to the graph builder.
///
/// Only `Class` and `Variable`/`Field` matter to the heuristic; everything
/// else collapses into a handful of buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Variable,
    Field,
    Function,
    Method,
    Constructor,
    Other,
}

impl SymbolKind {
    /// Get the string representation of the symbol kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Variable => "variable",
            SymbolKind::Field => "field",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Other => "other",
        }
    }

    /// Get all symbol kinds
    pub fn all() -> &'static [SymbolKind] {
        &[
            SymbolKind::Class,
            SymbolKind::Variable,
            SymbolKind::Field,
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Constructor,
            SymbolKind::Other,
        ]
    }
}

impl From<lsp_types::SymbolKind> for SymbolKind {
    fn from(kind: lsp_types::SymbolKind) -> Self {
        use lsp_types::SymbolKind as Lsp;
        match kind {
            Lsp::CLASS => SymbolKind::Class,
            Lsp::VARIABLE | Lsp::CONSTANT => SymbolKind::Variable,
            Lsp::FIELD | Lsp::PROPERTY => SymbolKind::Field,
            Lsp::FUNCTION => SymbolKind::Function,
            Lsp::METHOD => SymbolKind::Method,
            Lsp::CONSTRUCTOR => SymbolKind::Constructor,
            _ => SymbolKind::Other,
        }
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "class" | "container" | "struct" => Ok(SymbolKind::Class),
            "variable" | "var" | "const" | "final" => Ok(SymbolKind::Variable),
            "field" | "property" | "getter" => Ok(SymbolKind::Field),
            "function" | "fn" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "constructor" | "ctor" => Ok(SymbolKind::Constructor),
            "other" => Ok(SymbolKind::Other),
            _ => Err(Error::Provider(format!("Unknown symbol kind: {}", s))),
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named declaration with a file identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolEntry {
    /// Symbol name (just the identifier)
    pub name: String,
    pub kind: SymbolKind,
    /// Where the declaration's name sits
    pub location: Location,
}

impl SymbolEntry {
    pub fn new(name: impl Into<String>, kind: SymbolKind, location: Location) -> Self {
        Self {
            name: name.into(),
            kind,
            location,
        }
    }

    /// Exact name and kind match
    pub fn matches(&self, name: &str, kind: SymbolKind) -> bool {
        self.name == name && self.kind == kind
    }
}

/// A symbol as returned by a symbol provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum DocumentSymbol {
    /// Location-bearing symbol
    Located(SymbolEntry),
    /// Outline entry without a file identity
    Outline {
        name: String,
        kind: SymbolKind,
        start: Position,
        end: Position,
    },
}

impl DocumentSymbol {
    pub fn name(&self) -> &str {
        match self {
            DocumentSymbol::Located(entry) => &entry.name,
            DocumentSymbol::Outline { name, .. } => name,
        }
    }

    pub fn kind(&self) -> SymbolKind {
        match self {
            DocumentSymbol::Located(entry) => entry.kind,
            DocumentSymbol::Outline { kind, .. } => *kind,
        }
    }

    pub fn matches(&self, name: &str, kind: SymbolKind) -> bool {
        self.name() == name && self.kind() == kind
    }

    /// The located entry, if this symbol carries a file identity
    pub fn as_located(&self) -> Option<&SymbolEntry> {
        match self {
            DocumentSymbol::Located(entry) => Some(entry),
            DocumentSymbol::Outline { .. } => None,
        }
    }
}

impl From<SymbolEntry> for DocumentSymbol {
    fn from(entry: SymbolEntry) -> Self {
        DocumentSymbol::Located(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_kind_roundtrip() {
        for kind in SymbolKind::all() {
            let parsed: SymbolKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_symbol_kind_aliases() {
        assert_eq!(SymbolKind::from_str("Container").unwrap(), SymbolKind::Class);
        assert_eq!(SymbolKind::from_str("final").unwrap(), SymbolKind::Variable);
        assert!(SymbolKind::from_str("mixin").is_err());
    }

    #[test]
    fn test_lsp_kind_mapping() {
        assert_eq!(SymbolKind::from(lsp_types::SymbolKind::CLASS), SymbolKind::Class);
        assert_eq!(SymbolKind::from(lsp_types::SymbolKind::PROPERTY), SymbolKind::Field);
        assert_eq!(SymbolKind::from(lsp_types::SymbolKind::ENUM), SymbolKind::Other);
    }

    #[test]
    fn test_outline_symbol_is_not_located() {
        let outline = DocumentSymbol::Outline {
            name: "Command".to_string(),
            kind: SymbolKind::Class,
            start: Position::new(0, 6),
            end: Position::new(0, 13),
        };
        assert!(outline.matches("Command", SymbolKind::Class));
        assert!(outline.as_located().is_none());

        let located: DocumentSymbol =
            SymbolEntry::new("Command", SymbolKind::Class, Location::token("a.dart", 0, 6, 7)).into();
        assert!(located.as_located().is_some());
    }
}
