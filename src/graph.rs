//! Command Graph - two-level result of a build
//!
//! Roots are inferred `Command` bindings, leaves are the basenames of files
//! that use them. Roots and leaves share one flat id namespace and nothing is
//! deduplicated: a renderer sees exactly what the heuristic produced.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Node type the dashboard styles as a widget (square, blue)
pub const LEAF_NODE_TYPE: &str = "Widgets";

/// Root -> leaf relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Inferred variable name of the Command
    pub root: String,
    /// Basename of the referencing file
    pub leaf: String,
}

impl GraphEdge {
    pub fn new(root: impl Into<String>, leaf: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            leaf: leaf.into(),
        }
    }

    /// Renderer edge id: root and leaf concatenated, so ids can collide
    pub fn id(&self) -> String {
        format!("{}{}", self.root, self.leaf)
    }
}

/// The graph produced by one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandGraph {
    /// Inferred binding per surviving reference, in reference order; may hold
    /// empty strings and duplicates
    pub roots: Vec<String>,
    pub edges: Vec<GraphEdge>,
}

impl CommandGraph {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.edges.is_empty()
    }

    /// The message pushed to the rendering surface
    pub fn to_message(&self) -> RenderMessage {
        RenderMessage {
            main_refs: self.roots.clone(),
            sub_refs: self
                .edges
                .iter()
                .map(|e| SubRef {
                    parent: e.root.clone(),
                    name: e.leaf.clone(),
                })
                .collect(),
        }
    }

    /// Node/edge elements as a graph-drawing library consumes them.
    ///
    /// One node per root, then one leaf node and one edge per graph edge.
    pub fn to_elements(&self) -> GraphElements {
        let mut elements = GraphElements::default();
        for root in &self.roots {
            elements.nodes.push(NodeElement {
                data: NodeData {
                    id: root.clone(),
                    node_type: None,
                },
            });
        }
        for edge in &self.edges {
            elements.nodes.push(NodeElement {
                data: NodeData {
                    id: edge.leaf.clone(),
                    node_type: Some(LEAF_NODE_TYPE.to_string()),
                },
            });
            elements.edges.push(EdgeElement {
                data: EdgeData {
                    id: edge.id(),
                    source: edge.root.clone(),
                    target: edge.leaf.clone(),
                },
            });
        }
        elements
    }

    /// Distinct leaf files referencing `root`
    pub fn leaves_of(&self, root: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|e| e.root == root)
            .map(|e| e.leaf.as_str())
            .collect()
    }

    /// Get statistics about the graph
    pub fn stats(&self) -> GraphStats {
        let distinct_roots: BTreeSet<&str> = self.roots.iter().map(String::as_str).collect();
        let distinct_leaves: BTreeSet<&str> = self.edges.iter().map(|e| e.leaf.as_str()).collect();
        let edge_ids: BTreeSet<String> = self.edges.iter().map(GraphEdge::id).collect();
        let node_ids: BTreeSet<&str> = distinct_roots.union(&distinct_leaves).copied().collect();

        GraphStats {
            roots: self.roots.len(),
            unnamed_roots: self.roots.iter().filter(|r| r.is_empty()).count(),
            leaves: distinct_leaves.len(),
            edges: self.edges.len(),
            colliding_edge_ids: self.edges.len() - edge_ids.len(),
            colliding_node_ids: distinct_roots.len() + distinct_leaves.len() - node_ids.len(),
        }
    }
}

impl From<RenderMessage> for CommandGraph {
    fn from(message: RenderMessage) -> Self {
        Self {
            roots: message.main_refs,
            edges: message
                .sub_refs
                .into_iter()
                .map(|s| GraphEdge::new(s.parent, s.name))
                .collect(),
        }
    }
}

/// `{ mainRefs: [...], subRefs: [{ parent, name }] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMessage {
    pub main_refs: Vec<String>,
    pub sub_refs: Vec<SubRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRef {
    pub parent: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphElements {
    pub nodes: Vec<NodeElement>,
    pub edges: Vec<EdgeElement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeElement {
    pub data: NodeData,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeData {
    pub id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeElement {
    pub data: EdgeData,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeData {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Statistics about a command graph
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub roots: usize,
    pub unnamed_roots: usize,
    pub leaves: usize,
    pub edges: usize,
    pub colliding_edge_ids: usize,
    pub colliding_node_ids: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Command Graph Statistics:")?;
        writeln!(f, "  Commands: {} ({} unnamed)", self.roots, self.unnamed_roots)?;
        writeln!(f, "  Referencing files: {}", self.leaves)?;
        writeln!(
            f,
            "  Edges: {} (colliding ids: {})",
            self.edges, self.colliding_edge_ids
        )?;
        writeln!(f, "  Colliding node ids: {}", self.colliding_node_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> CommandGraph {
        CommandGraph {
            roots: vec!["save".to_string(), "load".to_string(), String::new()],
            edges: vec![
                GraphEdge::new("save", "editor.dart"),
                GraphEdge::new("load", "editor.dart"),
                GraphEdge::new("load", "list.dart"),
            ],
        }
    }

    #[test]
    fn test_message_shape() {
        let json = serde_json::to_value(sample_graph().to_message()).unwrap();
        assert_eq!(json["mainRefs"][0], "save");
        assert_eq!(json["subRefs"][2]["parent"], "load");
        assert_eq!(json["subRefs"][2]["name"], "list.dart");
    }

    #[test]
    fn test_message_back_to_graph() {
        let graph = sample_graph();
        assert_eq!(CommandGraph::from(graph.to_message()), graph);
    }

    #[test]
    fn test_elements_keep_duplicates() {
        let elements = sample_graph().to_elements();
        // 3 roots + one leaf node per edge
        assert_eq!(elements.nodes.len(), 6);
        assert_eq!(elements.edges.len(), 3);
        assert_eq!(elements.edges[0].data.id, "saveeditor.dart");

        let json = serde_json::to_value(&elements).unwrap();
        assert!(json["nodes"][0]["data"].get("type").is_none());
        assert_eq!(json["nodes"][3]["data"]["type"], LEAF_NODE_TYPE);
    }

    #[test]
    fn test_stats_report_collisions() {
        let mut graph = sample_graph();
        graph.roots.push("save".to_string());
        graph.edges.push(GraphEdge::new("save", "editor.dart"));
        graph.roots.push("list.dart".to_string());

        let stats = graph.stats();
        assert_eq!(stats.roots, 5);
        assert_eq!(stats.unnamed_roots, 1);
        assert_eq!(stats.leaves, 2);
        assert_eq!(stats.colliding_edge_ids, 1);
        assert_eq!(stats.colliding_node_ids, 1);

        let text = stats.to_string();
        assert!(text.contains("Edges: 4 (colliding ids: 1)"));
        assert!(text.contains("Colliding node ids: 1"));
    }

    #[test]
    fn test_leaves_of() {
        let graph = sample_graph();
        let leaves: Vec<&str> = graph.leaves_of("load").into_iter().collect();
        assert_eq!(leaves, vec!["editor.dart", "list.dart"]);
        assert!(graph.leaves_of("missing").is_empty());
    }
}
