//! Provider Framework
//!
//! The graph builder never reads source code or talks to a language server
//! directly. It asks four collaborators:
//! - workspace symbol search and document symbols ([`SymbolProvider`])
//! - find references ([`ReferenceProvider`])
//! - text ranges of documents ([`TextSource`])
//! - basenames, which are plain path arithmetic on [`Location`]
//!
//! Backends implement all three traits; [`Providers`] bundles them.
//! Columns are character offsets within a line.

pub mod snapshot;
pub mod lexical;
pub mod lsp;

pub use snapshot::SnapshotIndex;
pub use lexical::LexicalIndex;
pub use lsp::LspClient;

use crate::Result;
use crate::location::{Location, Position};
use crate::symbol::DocumentSymbol;
use async_trait::async_trait;

/// Source of name -> declaration lookups
#[async_trait]
pub trait SymbolProvider: Send + Sync {
    /// Workspace-wide fuzzy symbol search
    async fn workspace_symbols(&self, query: &str) -> Result<Vec<DocumentSymbol>>;

    /// All symbols declared in one file
    async fn document_symbols(&self, path: &str) -> Result<Vec<DocumentSymbol>>;
}

/// Source of declaration -> usage lookups
#[async_trait]
pub trait ReferenceProvider: Send + Sync {
    /// References to whatever symbol sits at `position` in `path`
    async fn references(&self, path: &str, position: Position) -> Result<Vec<Location>>;
}

/// Read access to document text
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Full text of a document
    async fn text(&self, path: &str) -> Result<String>;

    /// Text between two positions, clamped to the document bounds
    async fn read_range(&self, path: &str, start: Position, end: Position) -> Result<String> {
        let text = self.text(path).await?;
        Ok(slice_text(&text, start, end))
    }
}

/// Everything a backend has to answer
pub trait Backend: SymbolProvider + ReferenceProvider + TextSource {
    /// Borrow this backend as all three collaborators
    fn providers(&self) -> Providers<'_>;
}

impl<T: SymbolProvider + ReferenceProvider + TextSource> Backend for T {
    fn providers(&self) -> Providers<'_> {
        Providers::new(self, self, self)
    }
}

/// The collaborators the builder consumes, borrowed for one build
#[derive(Clone, Copy)]
pub struct Providers<'a> {
    pub symbols: &'a dyn SymbolProvider,
    pub references: &'a dyn ReferenceProvider,
    pub text: &'a dyn TextSource,
}

impl<'a> Providers<'a> {
    pub fn new(
        symbols: &'a dyn SymbolProvider,
        references: &'a dyn ReferenceProvider,
        text: &'a dyn TextSource,
    ) -> Self {
        Self {
            symbols,
            references,
            text,
        }
    }

    /// Use one backend for all collaborators
    pub fn from_backend<B: Backend>(backend: &'a B) -> Self {
        Self::new(backend, backend, backend)
    }
}

/// Text source backed by the file system
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskText;

#[async_trait]
impl TextSource for DiskText {
    async fn text(&self, path: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// Cut `[start, end)` out of `text`.
///
/// Lines past the end of the document clamp to its end; characters past the
/// end of a line clamp to the line end. An inverted range yields "".
pub fn slice_text(text: &str, start: Position, end: Position) -> String {
    if end < start {
        return String::new();
    }
    let start = position_to_offset(text, start);
    let end = position_to_offset(text, end);
    text[start..end.max(start)].to_string()
}

/// Byte offset where line `line` starts and its text without the terminator
fn line_bounds(text: &str, line: u32) -> Option<(usize, &str)> {
    let mut line_start = 0usize;
    for _ in 0..line {
        line_start += text[line_start..].find('\n')? + 1;
    }
    let line = text[line_start..].split('\n').next().unwrap_or("");
    Some((line_start, line.strip_suffix('\r').unwrap_or(line)))
}

/// Text of line `line` without its terminator, or `None` past the end
pub fn line_text(text: &str, line: u32) -> Option<&str> {
    line_bounds(text, line).map(|(_, line)| line)
}

/// Byte offset of a position, clamped to the document
pub fn position_to_offset(text: &str, position: Position) -> usize {
    let Some((line_start, line)) = line_bounds(text, position.line) else {
        return text.len();
    };
    let column = line
        .char_indices()
        .nth(position.character as usize)
        .map(|(idx, _)| idx)
        .unwrap_or(line.len());
    line_start + column
}

/// Character column for a UTF-16 column on `line`, clamped to the line end
pub fn utf16_to_char_column(line: &str, utf16: u32) -> u32 {
    let mut units = 0u32;
    for (chars, c) in line.chars().enumerate() {
        if units >= utf16 {
            return chars as u32;
        }
        units += c.len_utf16() as u32;
    }
    line.chars().count() as u32
}

/// UTF-16 column for a character column on `line`, clamped to the line end
pub fn char_to_utf16_column(line: &str, character: u32) -> u32 {
    line.chars()
        .take(character as usize)
        .map(|c| c.len_utf16() as u32)
        .sum()
}

/// Position of a byte offset
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let offset = offset.min(text.len());
    let before = &text[..offset];
    let line = before.matches('\n').count() as u32;
    let line_start = before.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    let character = text[line_start..offset].chars().count() as u32;
    Position::new(line, character)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "class Home {\n  final Command<void, String> fetch;\r\n}\n";

    #[test]
    fn test_slice_single_line() {
        let got = slice_text(DOC, Position::new(1, 8), Position::new(1, 15));
        assert_eq!(got, "Command");
    }

    #[test]
    fn test_slice_clamps_to_line_end() {
        let got = slice_text(DOC, Position::new(1, 15), Position::new(1, 500));
        assert_eq!(got, "<void, String> fetch;");
    }

    #[test]
    fn test_slice_past_document_end() {
        assert_eq!(slice_text(DOC, Position::new(9, 0), Position::new(9, 4)), "");
        assert_eq!(slice_text(DOC, Position::new(1, 9), Position::new(1, 2)), "");
    }

    #[test]
    fn test_offset_roundtrip() {
        let offset = DOC.find("fetch").unwrap();
        let pos = offset_to_position(DOC, offset);
        assert_eq!(pos, Position::new(1, 30));
        assert_eq!(position_to_offset(DOC, pos), offset);
    }

    #[tokio::test]
    async fn test_disk_text_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("home.dart");
        std::fs::write(&path, DOC).unwrap();
        let path = path.to_string_lossy().to_string();

        let got = DiskText
            .read_range(&path, Position::new(1, 8), Position::new(1, 15))
            .await
            .unwrap();
        assert_eq!(got, "Command");
        assert!(DiskText.text("/no/such/file.dart").await.is_err());
    }

    #[test]
    fn test_multibyte_columns() {
        let text = "// ü\nfinal Command<int> café;";
        let offset = text.find("café").unwrap();
        let pos = offset_to_position(text, offset);
        assert_eq!(pos, Position::new(1, 19));
        assert_eq!(slice_text(text, pos, pos.offset(4)), "café");
    }

    #[test]
    fn test_utf16_columns() {
        let line = "Text('\u{1F600}') Command x;";
        let chars = line.find("Command").map(|b| line[..b].chars().count()).unwrap() as u32;
        assert_eq!(chars, 10);
        assert_eq!(char_to_utf16_column(line, chars), 11);
        assert_eq!(utf16_to_char_column(line, 11), 10);
        assert_eq!(utf16_to_char_column(line, 500), line.chars().count() as u32);
        assert_eq!(line_text(DOC, 1), Some("  final Command<void, String> fetch;"));
        assert_eq!(line_text(DOC, 9), None);
    }
}
