use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::graph::{GraphElements, GraphStats, RenderMessage};
use crate::session::RebuildSession;

#[derive(Serialize)]
pub struct StatsResponse {
    pub generation: u64,
    pub root: String,
    #[serde(flatten)]
    pub stats: GraphStats,
}

/// The render message of the latest published graph
pub async fn get_graph(State(session): State<Arc<RebuildSession>>) -> Json<RenderMessage> {
    Json(session.latest().graph.to_message())
}

pub async fn get_elements(State(session): State<Arc<RebuildSession>>) -> Json<GraphElements> {
    Json(session.latest().graph.to_elements())
}

pub async fn get_stats(State(session): State<Arc<RebuildSession>>) -> Json<StatsResponse> {
    let latest = session.latest();
    Json(StatsResponse {
        generation: latest.generation,
        root: session.root().display().to_string(),
        stats: latest.graph.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SymbolGraphBuilder;
    use crate::location::Location;
    use crate::provider::{Providers, SnapshotIndex};
    use crate::symbol::{SymbolEntry, SymbolKind};

    async fn built_session() -> Arc<RebuildSession> {
        let decl = Location::token("/ws/lib/command.dart", 0, 6, 7);
        let mut index = SnapshotIndex::new();
        index.add_symbol(SymbolEntry::new("Command", SymbolKind::Class, decl.clone()));
        index.add_file("/ws/lib/model.dart", "final Command> save;\n");
        index.add_file("/ws/lib/editor.dart", "model.save();\n");
        index.add_references(decl, vec![Location::token("/ws/lib/model.dart", 0, 6, 7)]);
        index.add_references(
            Location::token("/ws/lib/model.dart", 0, 15, 4),
            vec![
                Location::token("/ws/lib/model.dart", 0, 15, 4),
                Location::token("/ws/lib/editor.dart", 0, 6, 4),
            ],
        );

        let session = Arc::new(RebuildSession::new("/ws", SymbolGraphBuilder::default()));
        session.request_rebuild(Providers::from_backend(&index)).await;
        session
    }

    #[tokio::test]
    async fn test_graph_route_returns_message() {
        let session = built_session().await;
        let Json(message) = get_graph(State(session)).await;
        assert_eq!(message.main_refs, vec!["save"]);
        assert_eq!(message.sub_refs.len(), 1);
        assert_eq!(message.sub_refs[0].name, "editor.dart");
    }

    #[tokio::test]
    async fn test_elements_route() {
        let session = built_session().await;
        let Json(elements) = get_elements(State(session)).await;
        assert_eq!(elements.nodes.len(), 2);
        assert_eq!(elements.edges[0].data.id, "saveeditor.dart");
    }

    #[tokio::test]
    async fn test_stats_route_before_first_build() {
        let session = Arc::new(RebuildSession::new("/ws", SymbolGraphBuilder::default()));
        let Json(stats) = get_stats(State(session)).await;
        assert_eq!(stats.generation, 0);
        assert_eq!(stats.stats.roots, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["edges"], 0);
    }
}
