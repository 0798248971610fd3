//! Lexical Index - Text-only backend
//!
//! Stands in for a language server when none is available. Declarations are
//! found with regexes, references are whole-word occurrences of the
//! identifier under the cursor across every source file. No scopes, no
//! types: two unrelated variables with the same name are the same symbol here.
//! Only the workspace is indexed, so a class declared in a package dependency
//! is never found and the graph comes out empty.
//!
//! Files are walked with the `ignore` crate so `.gitignore` is respected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::Regex;

use super::{position_to_offset, offset_to_position, ReferenceProvider, SymbolProvider, TextSource};
use crate::location::{Location, Position};
use crate::symbol::{DocumentSymbol, SymbolEntry, SymbolKind};
use crate::{Error, Result};

static DECLARATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:(?:abstract|base|final|sealed|interface)\s+)*(class|mixin|enum|extension)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("static declaration pattern")
});

/// Directories that never hold hand-written sources
pub const SKIP_DIRS: &[&str] = &[".dart_tool", "build", ".git", ".idea", ".vscode"];

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Text-based backend over a scanned workspace.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    root: PathBuf,
    extension: String,
    /// Source texts keyed by path, sorted so reference order is file-then-position
    files: BTreeMap<String, String>,
    declarations: Vec<SymbolEntry>,
}

impl LexicalIndex {
    /// Walk `root` and index every file ending in `.<extension>`
    pub fn scan(root: &Path, extension: &str) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::MissingDependency(format!(
                "workspace root {} is not a directory",
                root.display()
            )));
        }

        let extension = extension.trim_start_matches('.');
        let mut index = Self {
            root: root.to_path_buf(),
            extension: extension.to_string(),
            ..Self::default()
        };

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_some_and(|t| t.is_dir()) && SKIP_DIRS.contains(&name.as_ref()))
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file())
                || path.extension().and_then(|e| e.to_str()) != Some(extension)
            {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(content) => index.add_file(path.to_string_lossy().to_string(), content),
                Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
            }
        }

        tracing::debug!(
            "Lexical index: {} files, {} declarations under {}",
            index.files.len(),
            index.declarations.len(),
            root.display()
        );
        Ok(index)
    }

    /// Fresh scan of the same root and extension
    pub fn rescan(&self) -> Result<Self> {
        Self::scan(&self.root, &self.extension)
    }

    /// Index one file's text
    pub fn add_file(&mut self, path: String, content: String) {
        for caps in DECLARATION_RE.captures_iter(&content) {
            let (Some(keyword), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let kind = match keyword.as_str() {
                "class" => SymbolKind::Class,
                _ => SymbolKind::Other,
            };
            let start = offset_to_position(&content, name.start());
            let location = Location::new(
                path.clone(),
                start,
                start.offset(name.as_str().chars().count() as u32),
            );
            self.declarations.push(SymbolEntry::new(name.as_str(), kind, location));
        }
        self.files.insert(path, content);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Identifier spanning `position`, if any
    fn identifier_at(&self, path: &str, position: Position) -> Option<String> {
        let text = self.files.get(path)?;
        let offset = position_to_offset(text, position);
        let before = text[..offset]
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_identifier_char(*c))
            .last()
            .map(|(idx, _)| idx)
            .unwrap_or(offset);
        let after = text[offset..]
            .char_indices()
            .find(|(_, c)| !is_identifier_char(*c))
            .map(|(idx, _)| offset + idx)
            .unwrap_or(text.len());
        let word = &text[before..after];
        (!word.is_empty()).then(|| word.to_string())
    }

    /// Whole-word occurrences of `word`, skipping comments and declarations
    fn occurrences(&self, word: &str) -> Result<Vec<Location>> {
        let pattern = Regex::new(&format!(r"(^|[^\w$]){}($|[^\w$])", regex::escape(word)))?;
        let len = word.chars().count() as u32;
        let mut found = Vec::new();

        for (path, text) in &self.files {
            for (line_no, line) in text.lines().enumerate() {
                let code = line.split("//").next().unwrap_or("");
                let mut search_from = 0;
                while let Some(caps) = pattern.captures_at(code, search_from) {
                    let Some(whole) = caps.get(0) else { break };
                    let lead = caps.get(1).map(|m| m.len()).unwrap_or(0);
                    let start = whole.start() + lead;
                    // Resume right after the word so adjacent occurrences still match
                    search_from = start + word.len();

                    let prefix = code[..start].trim_end();
                    if ["class", "mixin", "enum", "extension"]
                        .iter()
                        .any(|kw| prefix.ends_with(kw))
                    {
                        continue;
                    }
                    let character = code[..start].chars().count() as u32;
                    found.push(Location::token(path.clone(), line_no as u32, character, len));
                }
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl SymbolProvider for LexicalIndex {
    async fn workspace_symbols(&self, query: &str) -> Result<Vec<DocumentSymbol>> {
        let needle = query.trim_start_matches('#').to_lowercase();
        Ok(self
            .declarations
            .iter()
            .filter(|d| d.name.to_lowercase().contains(&needle))
            .cloned()
            .map(DocumentSymbol::Located)
            .collect())
    }

    async fn document_symbols(&self, path: &str) -> Result<Vec<DocumentSymbol>> {
        Ok(self
            .declarations
            .iter()
            .filter(|d| d.location.path == path)
            .cloned()
            .map(DocumentSymbol::Located)
            .collect())
    }
}

#[async_trait]
impl ReferenceProvider for LexicalIndex {
    async fn references(&self, path: &str, position: Position) -> Result<Vec<Location>> {
        match self.identifier_at(path, position) {
            Some(word) => self.occurrences(&word),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl TextSource for LexicalIndex {
    async fn text(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("{} is not an indexed source file", path)))
    }
}
