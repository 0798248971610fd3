//! Snapshot Index - In-memory symbol/reference/text backend
//!
//! Holds a frozen picture of what a language server would answer: declared
//! symbols, reference groups and document texts. Snapshots round-trip through
//! JSON so a workspace can be recorded once (see [`SnapshotRecorder`]) and
//! replayed offline.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Providers, ReferenceProvider, SymbolProvider, TextSource};
use crate::location::{Location, Position};
use crate::symbol::{DocumentSymbol, SymbolEntry};
use crate::{Error, Result};

/// One symbol and everything that refers to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceGroup {
    /// Declaration (or any representative occurrence) of the symbol
    pub target: Location,
    /// All references, in provider order
    pub locations: Vec<Location>,
}

impl ReferenceGroup {
    /// Whether a query at `path:position` resolves to this group
    fn answers(&self, path: &str, position: Position) -> bool {
        covers(&self.target, path, position)
            || self.locations.iter().any(|loc| covers(loc, path, position))
    }
}

fn covers(loc: &Location, path: &str, position: Position) -> bool {
    loc.path == path && loc.start <= position && (position < loc.end || position == loc.start)
}

/// Serialized form of a [`SnapshotIndex`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub symbols: Vec<SymbolEntry>,
    /// Outline-only document symbols, keyed by file
    #[serde(default)]
    pub outlines: BTreeMap<String, Vec<DocumentSymbol>>,
    #[serde(default)]
    pub references: Vec<ReferenceGroup>,
    /// Document texts, keyed by file
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// In-memory backend answering from a snapshot.
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    /// All located symbols, in insertion order
    symbols: Vec<SymbolEntry>,
    /// Symbol indices by file path
    symbols_by_path: HashMap<String, Vec<usize>>,
    /// Outline entries by file path
    outlines: BTreeMap<String, Vec<DocumentSymbol>>,
    references: Vec<ReferenceGroup>,
    files: BTreeMap<String, String>,
}

impl SnapshotIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn has_symbol(&self, entry: &SymbolEntry) -> bool {
        self.symbols_by_path
            .get(&entry.location.path)
            .is_some_and(|ids| ids.iter().any(|&idx| self.symbols[idx] == *entry))
    }

    /// Add a located symbol
    pub fn add_symbol(&mut self, entry: SymbolEntry) {
        self.symbols_by_path
            .entry(entry.location.path.clone())
            .or_default()
            .push(self.symbols.len());
        self.symbols.push(entry);
    }

    /// Add an outline-only symbol to a file's document symbols
    pub fn add_outline(&mut self, path: impl Into<String>, symbol: DocumentSymbol) {
        self.outlines.entry(path.into()).or_default().push(symbol);
    }

    /// Add a reference group
    pub fn add_references(&mut self, target: Location, locations: Vec<Location>) {
        self.references.push(ReferenceGroup { target, locations });
    }

    /// Add (or replace) a document's text
    pub fn add_file(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut index = Self::new();
        for entry in snapshot.symbols {
            index.add_symbol(entry);
        }
        index.outlines = snapshot.outlines;
        index.references = snapshot.references;
        index.files = snapshot.files;
        index
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            symbols: self.symbols.clone(),
            outlines: self.outlines.clone(),
            references: self.references.clone(),
            files: self.files.clone(),
        }
    }

    /// Load a JSON snapshot from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingDependency(format!(
                "snapshot file {} does not exist",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the index as a JSON snapshot
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.to_snapshot())?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get statistics about the index
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            symbols: self.symbols.len(),
            reference_groups: self.references.len(),
            references: self.references.iter().map(|g| g.locations.len()).sum(),
            files: self.files.len(),
        }
    }
}

#[async_trait]
impl SymbolProvider for SnapshotIndex {
    async fn workspace_symbols(&self, query: &str) -> Result<Vec<DocumentSymbol>> {
        let needle = query.trim_start_matches('#').to_lowercase();
        Ok(self
            .symbols
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .cloned()
            .map(DocumentSymbol::Located)
            .collect())
    }

    async fn document_symbols(&self, path: &str) -> Result<Vec<DocumentSymbol>> {
        let located = self
            .symbols_by_path
            .get(path)
            .into_iter()
            .flatten()
            .map(|&idx| DocumentSymbol::Located(self.symbols[idx].clone()));
        let outlines = self.outlines.get(path).into_iter().flatten().cloned();
        Ok(located.chain(outlines).collect())
    }
}

#[async_trait]
impl ReferenceProvider for SnapshotIndex {
    /// A group recorded for exactly this position wins over one that merely covers it
    async fn references(&self, path: &str, position: Position) -> Result<Vec<Location>> {
        let exact = self
            .references
            .iter()
            .find(|group| group.target.path == path && group.target.start == position);
        Ok(exact
            .or_else(|| self.references.iter().find(|group| group.answers(path, position)))
            .map(|group| group.locations.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TextSource for SnapshotIndex {
    async fn text(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("No text recorded for {}", path)))
    }
}

/// Wraps live providers and writes down every answer they give.
///
/// Running a build through the recorder yields an index that replays that
/// build offline: each reference query becomes a group targeted at the
/// queried position.
pub struct SnapshotRecorder<'a> {
    inner: Providers<'a>,
    recorded: Mutex<SnapshotIndex>,
}

impl<'a> SnapshotRecorder<'a> {
    pub fn new(inner: Providers<'a>) -> Self {
        Self {
            inner,
            recorded: Mutex::new(SnapshotIndex::new()),
        }
    }

    /// Everything recorded so far
    pub fn into_index(self) -> SnapshotIndex {
        self.recorded.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, f: impl FnOnce(&mut SnapshotIndex)) {
        let mut index = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut index);
    }

    fn record_symbols(&self, path: Option<&str>, symbols: &[DocumentSymbol]) {
        self.record(|index| {
            for symbol in symbols {
                match symbol {
                    DocumentSymbol::Located(entry) => {
                        if !index.has_symbol(entry) {
                            index.add_symbol(entry.clone());
                        }
                    }
                    outline => {
                        let Some(path) = path else { continue };
                        let known = index
                            .outlines
                            .get(path)
                            .is_some_and(|known| known.contains(outline));
                        if !known {
                            index.add_outline(path, outline.clone());
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl SymbolProvider for SnapshotRecorder<'_> {
    async fn workspace_symbols(&self, query: &str) -> Result<Vec<DocumentSymbol>> {
        let symbols = self.inner.symbols.workspace_symbols(query).await?;
        self.record_symbols(None, &symbols);
        Ok(symbols)
    }

    async fn document_symbols(&self, path: &str) -> Result<Vec<DocumentSymbol>> {
        let symbols = self.inner.symbols.document_symbols(path).await?;
        self.record_symbols(Some(path), &symbols);
        Ok(symbols)
    }
}

#[async_trait]
impl ReferenceProvider for SnapshotRecorder<'_> {
    async fn references(&self, path: &str, position: Position) -> Result<Vec<Location>> {
        let locations = self.inner.references.references(path, position).await?;
        self.record(|index| {
            index.add_references(Location::new(path, position, position), locations.clone())
        });
        Ok(locations)
    }
}

#[async_trait]
impl TextSource for SnapshotRecorder<'_> {
    async fn text(&self, path: &str) -> Result<String> {
        let text = self.inner.text.text(path).await?;
        self.record(|index| index.add_file(path, text.clone()));
        Ok(text)
    }
}

/// Statistics about a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub symbols: usize,
    pub reference_groups: usize,
    pub references: usize,
    pub files: usize,
}

impl std::fmt::Display for SnapshotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Snapshot Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Symbols: {}", self.symbols)?;
        writeln!(
            f,
            "  References: {} (in {} groups)",
            self.references, self.reference_groups
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;

    fn sample_index() -> SnapshotIndex {
        let mut index = SnapshotIndex::new();
        let decl = Location::token("/ws/lib/command.dart", 0, 6, 7);
        index.add_symbol(SymbolEntry::new("Command", SymbolKind::Class, decl.clone()));
        index.add_symbol(SymbolEntry::new(
            "CommandBuilder",
            SymbolKind::Class,
            Location::token("/ws/lib/builder.dart", 2, 6, 14),
        ));
        index.add_references(
            decl,
            vec![
                Location::token("/ws/lib/a.dart", 4, 8, 7),
                Location::token("/ws/lib/b.dart", 1, 2, 7),
            ],
        );
        index.add_file("/ws/lib/command.dart", "class Command {}\n");
        index
    }

    #[tokio::test]
    async fn test_workspace_symbols_fuzzy() {
        let index = sample_index();
        let hits = index.workspace_symbols("#command").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|s| s.as_located().is_some()));
    }

    #[tokio::test]
    async fn test_references_from_any_occurrence() {
        let index = sample_index();
        let from_decl = index
            .references("/ws/lib/command.dart", Position::new(0, 6))
            .await
            .unwrap();
        assert_eq!(from_decl.len(), 2);

        let from_use = index.references("/ws/lib/b.dart", Position::new(1, 5)).await.unwrap();
        assert_eq!(from_use, from_decl);

        let nothing = index.references("/ws/lib/b.dart", Position::new(1, 9)).await.unwrap();
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn test_document_symbols_include_outlines() {
        let mut index = sample_index();
        index.add_outline(
            "/ws/lib/command.dart",
            DocumentSymbol::Outline {
                name: "execute".to_string(),
                kind: SymbolKind::Method,
                start: Position::new(1, 2),
                end: Position::new(1, 9),
            },
        );
        let symbols = index.document_symbols("/ws/lib/command.dart").await.unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name(), "Command");
        assert_eq!(symbols[1].name(), "execute");
    }

    #[tokio::test]
    async fn test_missing_text_is_an_error() {
        let index = sample_index();
        assert!(index.text("/ws/lib/a.dart").await.is_err());
        assert_eq!(index.text("/ws/lib/command.dart").await.unwrap(), "class Command {}\n");
    }

    #[test]
    fn test_snapshot_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let index = sample_index();
        index.save(&path).unwrap();

        let loaded = SnapshotIndex::load(&path).unwrap();
        let stats = loaded.stats();
        assert_eq!(stats.symbols, 2);
        assert_eq!(stats.references, 2);
        assert_eq!(stats.files, 1);
    }

    #[tokio::test]
    async fn test_exact_target_preferred() {
        let mut index = sample_index();
        index.add_references(
            Location::new("/ws/lib/b.dart", Position::new(1, 4), Position::new(1, 4)),
            vec![Location::token("/ws/lib/c.dart", 0, 0, 3)],
        );
        let refs = index.references("/ws/lib/b.dart", Position::new(1, 4)).await.unwrap();
        assert_eq!(refs, vec![Location::token("/ws/lib/c.dart", 0, 0, 3)]);
    }

    #[tokio::test]
    async fn test_recorder_replays_build() {
        use crate::builder::SymbolGraphBuilder;

        let live = sample_index();
        let recorder = SnapshotRecorder::new(Providers::from_backend(&live));
        recorder.workspace_symbols("Command").await.unwrap();
        recorder.document_symbols("/ws/lib/command.dart").await.unwrap();
        recorder.text("/ws/lib/command.dart").await.unwrap();
        let live_refs = recorder
            .references("/ws/lib/command.dart", Position::new(0, 6))
            .await
            .unwrap();

        let replay = recorder.into_index();
        let stats = replay.stats();
        assert_eq!(stats.symbols, 2);
        assert_eq!(stats.reference_groups, 1);
        assert_eq!(stats.files, 1);
        assert_eq!(
            replay.references("/ws/lib/command.dart", Position::new(0, 6)).await.unwrap(),
            live_refs
        );

        let builder = SymbolGraphBuilder::default();
        let graph = builder.build(Path::new("/ws"), Providers::from_backend(&replay)).await;
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_missing_snapshot_file() {
        let err = SnapshotIndex::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, Error::MissingDependency(_)));
    }
}
