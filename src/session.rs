//! Rebuild Session - owner of the latest graph
//!
//! The host integration layer (CLI watch loop, HTTP server) owns one session
//! and hands it the providers for each rebuild. Rebuilds are serialized and
//! the newest request wins:
//! - every request takes a generation number
//! - a request that is no longer the newest when it gets the lock is dropped
//! - a finished build is published only if no newer request arrived meanwhile
//!
//! Renderers subscribe to a `watch` channel; there is no way back.
//!
//! [`run_triggers`] is the host loop: it drains watcher triggers, collapsing
//! whatever queued up during the previous build into one refresh and rebuild.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};

use crate::builder::SymbolGraphBuilder;
use crate::graph::{CommandGraph, GraphStats};
use crate::provider::Providers;
use crate::watcher::RebuildTrigger;

/// A graph as last published by the session
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishedGraph {
    /// Generation of the request that produced it (0 = nothing built yet)
    pub generation: u64,
    pub graph: CommandGraph,
}

/// What happened to one rebuild request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Built and pushed to subscribers
    Published { generation: u64 },
    /// A newer request arrived; nothing published
    Superseded { generation: u64 },
    /// The build failed; subscribers keep the previous graph
    Failed { generation: u64, error: String },
}

/// Explicit replacement for a process-wide "current dashboard".
pub struct RebuildSession {
    root: PathBuf,
    builder: SymbolGraphBuilder,
    requested: AtomicU64,
    build_lock: Mutex<()>,
    latest: watch::Sender<Arc<PublishedGraph>>,
}

impl RebuildSession {
    pub fn new(root: impl Into<PathBuf>, builder: SymbolGraphBuilder) -> Self {
        let (latest, _) = watch::channel(Arc::new(PublishedGraph::default()));
        Self {
            root: root.into(),
            builder,
            requested: AtomicU64::new(0),
            build_lock: Mutex::new(()),
            latest,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Receiver that sees every published graph
    pub fn subscribe(&self) -> watch::Receiver<Arc<PublishedGraph>> {
        self.latest.subscribe()
    }

    /// The most recently published graph
    pub fn latest(&self) -> Arc<PublishedGraph> {
        self.latest.borrow().clone()
    }

    /// Stats of the most recently published graph
    pub fn stats(&self) -> GraphStats {
        self.latest.borrow().graph.stats()
    }

    /// Rebuild from scratch with `providers`, latest request wins
    pub async fn request_rebuild(&self, providers: Providers<'_>) -> RebuildOutcome {
        let generation = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.build_lock.lock().await;

        if self.requested.load(Ordering::SeqCst) != generation {
            tracing::debug!("Rebuild {} superseded before it started", generation);
            return RebuildOutcome::Superseded { generation };
        }

        let graph = match self.builder.try_build(&self.root, providers).await {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!("Rebuild {} failed, keeping previous graph: {}", generation, e);
                return RebuildOutcome::Failed {
                    generation,
                    error: e.to_string(),
                };
            }
        };

        if self.requested.load(Ordering::SeqCst) != generation {
            tracing::debug!("Rebuild {} superseded while building", generation);
            return RebuildOutcome::Superseded { generation };
        }

        let stats = graph.stats();
        tracing::info!(
            "Rebuild {}: {} commands, {} edges",
            generation,
            stats.roots,
            stats.edges
        );
        self.latest
            .send_replace(Arc::new(PublishedGraph { generation, graph }));
        RebuildOutcome::Published { generation }
    }
}

/// Providers that can catch up with the file system before a rebuild
pub trait RebuildSource {
    /// Pick up changes on disk
    fn refresh(&mut self) -> crate::Result<()>;

    fn providers(&self) -> Providers<'_>;
}

/// Rebuild on watcher triggers until the channel closes.
///
/// Each pass takes every trigger queued so far, refreshes `source` once and
/// requests one rebuild. `on_publish` runs after each published graph.
/// Returns the number of published graphs.
pub async fn run_triggers<S, F>(
    session: &RebuildSession,
    triggers: &mut mpsc::Receiver<RebuildTrigger>,
    source: &mut S,
    mut on_publish: F,
) -> usize
where
    S: RebuildSource,
    F: FnMut(&RebuildSession),
{
    let mut published = 0;

    while let Some(mut trigger) = triggers.recv().await {
        let mut skipped = 0;
        while let Ok(next) = triggers.try_recv() {
            trigger = next;
            skipped += 1;
        }
        if skipped > 0 {
            tracing::debug!("Folded {} queued triggers into {}", skipped, trigger);
        }
        crate::ui::trigger(&trigger);

        if let Err(e) = source.refresh() {
            tracing::warn!("Refresh after {} failed, keeping previous graph: {}", trigger, e);
            continue;
        }
        if let RebuildOutcome::Published { .. } = session.request_rebuild(source.providers()).await {
            published += 1;
            on_publish(session);
        }
    }

    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Location, Position};
    use crate::provider::{ReferenceProvider, SnapshotIndex, SymbolProvider, TextSource};
    use crate::symbol::{DocumentSymbol, SymbolEntry, SymbolKind};
    use crate::Result;
    use async_trait::async_trait;
    use std::path::PathBuf;

    fn sample_index(variable: &str) -> SnapshotIndex {
        let decl = Location::token("/ws/lib/command.dart", 0, 6, 7);
        let mut index = SnapshotIndex::new();
        index.add_symbol(SymbolEntry::new("Command", SymbolKind::Class, decl.clone()));
        index.add_file("/ws/lib/command.dart", "class Command {}\n");
        index.add_file("/ws/lib/model.dart", format!("final Command> {};\n", variable));
        index.add_references(decl, vec![Location::token("/ws/lib/model.dart", 0, 6, 7)]);
        index
    }

    /// Yields once before answering so concurrent requests interleave
    struct Yielding(SnapshotIndex);

    #[async_trait]
    impl SymbolProvider for Yielding {
        async fn workspace_symbols(&self, query: &str) -> Result<Vec<DocumentSymbol>> {
            tokio::task::yield_now().await;
            self.0.workspace_symbols(query).await
        }

        async fn document_symbols(&self, path: &str) -> Result<Vec<DocumentSymbol>> {
            self.0.document_symbols(path).await
        }
    }

    #[async_trait]
    impl ReferenceProvider for Yielding {
        async fn references(&self, path: &str, position: Position) -> Result<Vec<Location>> {
            self.0.references(path, position).await
        }
    }

    #[async_trait]
    impl TextSource for Yielding {
        async fn text(&self, path: &str) -> Result<String> {
            self.0.text(path).await
        }
    }

    #[tokio::test]
    async fn test_publishes_to_subscribers() {
        let session = RebuildSession::new("/ws", SymbolGraphBuilder::default());
        let mut rx = session.subscribe();
        assert_eq!(session.latest().generation, 0);

        let index = sample_index("save");
        let outcome = session.request_rebuild(Providers::from_backend(&index)).await;
        assert_eq!(outcome, RebuildOutcome::Published { generation: 1 });

        assert!(rx.has_changed().unwrap());
        let published = rx.borrow_and_update().clone();
        assert_eq!(published.graph.roots, vec!["save"]);
        assert_eq!(session.stats().roots, 1);
    }

    #[tokio::test]
    async fn test_latest_request_wins() {
        let session = RebuildSession::new("/ws", SymbolGraphBuilder::default());
        let first = Yielding(sample_index("first"));
        let second = Yielding(sample_index("second"));
        let third = Yielding(sample_index("third"));

        let (a, b, c) = tokio::join!(
            session.request_rebuild(Providers::from_backend(&first)),
            session.request_rebuild(Providers::from_backend(&second)),
            session.request_rebuild(Providers::from_backend(&third)),
        );

        assert_eq!(a, RebuildOutcome::Superseded { generation: 1 });
        assert_eq!(b, RebuildOutcome::Superseded { generation: 2 });
        assert_eq!(c, RebuildOutcome::Published { generation: 3 });
        assert_eq!(session.latest().graph.roots, vec!["third"]);
    }

    struct Broken;

    #[async_trait]
    impl SymbolProvider for Broken {
        async fn workspace_symbols(&self, _query: &str) -> Result<Vec<DocumentSymbol>> {
            Err(crate::Error::Provider("server went away".to_string()))
        }

        async fn document_symbols(&self, _path: &str) -> Result<Vec<DocumentSymbol>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_stale_graph() {
        let session = RebuildSession::new("/ws", SymbolGraphBuilder::default());
        let index = sample_index("save");
        session.request_rebuild(Providers::from_backend(&index)).await;

        let outcome = session
            .request_rebuild(Providers::new(&Broken, &index, &index))
            .await;
        assert!(matches!(outcome, RebuildOutcome::Failed { generation: 2, .. }));
        let latest = session.latest();
        assert_eq!(latest.generation, 1);
        assert_eq!(latest.graph.roots, vec!["save"]);
    }

    /// Snapshot source that counts refreshes and can push a trigger mid-build
    struct CountingSource {
        index: SnapshotIndex,
        refreshes: usize,
        fail: bool,
        follow_up: Option<mpsc::Sender<RebuildTrigger>>,
    }

    impl CountingSource {
        fn new(index: SnapshotIndex) -> Self {
            Self {
                index,
                refreshes: 0,
                fail: false,
                follow_up: None,
            }
        }
    }

    impl RebuildSource for CountingSource {
        fn refresh(&mut self) -> Result<()> {
            self.refreshes += 1;
            if let Some(tx) = self.follow_up.take() {
                tx.try_send(saved("/ws/lib/late.dart")).unwrap();
            }
            if self.fail {
                return Err(crate::Error::Provider("index unreadable".to_string()));
            }
            Ok(())
        }

        fn providers(&self) -> Providers<'_> {
            Providers::from_backend(&self.index)
        }
    }

    fn saved(path: &str) -> RebuildTrigger {
        RebuildTrigger::Saved(PathBuf::from(path))
    }

    #[tokio::test]
    async fn test_trigger_burst_builds_once() {
        let session = RebuildSession::new("/ws", SymbolGraphBuilder::default());
        let (tx, mut rx) = mpsc::channel(16);
        for i in 0..5 {
            tx.send(saved(&format!("/ws/lib/page_{}.dart", i))).await.unwrap();
        }
        drop(tx);

        let mut source = CountingSource::new(sample_index("save"));
        let mut seen = Vec::new();
        let published = run_triggers(&session, &mut rx, &mut source, |s| {
            seen.push(s.latest().generation)
        })
        .await;

        assert_eq!(published, 1);
        assert_eq!(source.refreshes, 1);
        assert_eq!(seen, vec![1]);
        assert_eq!(session.latest().graph.roots, vec!["save"]);
    }

    #[tokio::test]
    async fn test_trigger_during_build_starts_another() {
        let session = RebuildSession::new("/ws", SymbolGraphBuilder::default());
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(saved("/ws/lib/a.dart")).await.unwrap();

        let mut source = CountingSource::new(sample_index("save"));
        source.follow_up = Some(tx);
        let mut seen = Vec::new();
        let published = run_triggers(&session, &mut rx, &mut source, |s| {
            seen.push(s.latest().generation)
        })
        .await;

        assert_eq!(published, 2);
        assert_eq!(source.refreshes, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_refresh_skips_rebuild() {
        let session = RebuildSession::new("/ws", SymbolGraphBuilder::default());
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(saved("/ws/lib/a.dart")).await.unwrap();
        drop(tx);

        let mut source = CountingSource::new(sample_index("save"));
        source.fail = true;
        let published = run_triggers(&session, &mut rx, &mut source, |_| {}).await;

        assert_eq!(published, 0);
        assert_eq!(source.refreshes, 1);
        assert_eq!(session.latest().generation, 0);
    }
}
