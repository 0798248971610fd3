//! Graph renderers
//!
//! The dashboard only needs the JSON message; DOT and Mermaid are there for
//! docs and CI artifacts. Ids keep the flat namespace of the dashboard: a root
//! and a file with the same name are the same node.

use std::collections::HashMap;
use std::fmt::Write;

use crate::Result;
use crate::graph::CommandGraph;
use crate::ui::table::UNNAMED;

/// Output format for a rendered graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Colored table for terminals (default)
    #[default]
    Human,
    /// `{mainRefs, subRefs}` render message
    Json,
    /// Node/edge elements for graph-drawing libraries
    Elements,
    /// Graphviz DOT
    Dot,
    /// Mermaid flowchart
    Mermaid,
}

/// Render `graph` in `format`
pub fn render(graph: &CommandGraph, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Human => crate::ui::graph_table(graph),
        OutputFormat::Json => serde_json::to_string_pretty(&graph.to_message())?,
        OutputFormat::Elements => serde_json::to_string_pretty(&graph.to_elements())?,
        OutputFormat::Dot => render_dot(graph),
        OutputFormat::Mermaid => render_mermaid(graph),
    })
}

/// Escape a string for a quoted DOT id.
fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape a string for safe use in Mermaid node labels (quotes inside labels break the syntax).
fn escape_mermaid_label(s: &str) -> String {
    s.replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('{', "&#123;")
        .replace('}', "&#125;")
}

fn label(id: &str) -> &str {
    if id.is_empty() { UNNAMED } else { id }
}

/// Render the graph as a Graphviz digraph.
pub fn render_dot(graph: &CommandGraph) -> String {
    let mut out = String::new();
    writeln!(out, "digraph commands {{").unwrap();
    writeln!(out, "  rankdir=TB;").unwrap();
    writeln!(out, "  node [style=filled];").unwrap();

    for root in &graph.roots {
        writeln!(
            out,
            "  \"{}\" [label=\"{}\", shape=ellipse, fillcolor=\"#A9DFBF\"];",
            escape_dot(root),
            escape_dot(label(root))
        )
        .unwrap();
    }
    for edge in &graph.edges {
        writeln!(
            out,
            "  \"{}\" [shape=box, fillcolor=\"#AED6F1\"];",
            escape_dot(&edge.leaf)
        )
        .unwrap();
    }
    for edge in &graph.edges {
        writeln!(
            out,
            "  \"{}\" -> \"{}\" [color=orange];",
            escape_dot(&edge.root),
            escape_dot(&edge.leaf)
        )
        .unwrap();
    }

    writeln!(out, "}}").unwrap();
    out
}

/// Render the graph as a Mermaid flowchart.
///
/// Mermaid ids must be plain identifiers, so every distinct node id gets a
/// stable `nN` alias in first-seen order.
pub fn render_mermaid(graph: &CommandGraph) -> String {
    let mut out = String::new();
    writeln!(out, "flowchart TB").unwrap();

    let mut aliases: HashMap<&str, String> = HashMap::new();

    for root in &graph.roots {
        if aliases.contains_key(root.as_str()) {
            continue;
        }
        let alias = format!("n{}", aliases.len());
        writeln!(out, "  {}([\"{}\"])", alias, escape_mermaid_label(label(root))).unwrap();
        aliases.insert(root.as_str(), alias);
    }
    for edge in &graph.edges {
        if aliases.contains_key(edge.leaf.as_str()) {
            continue;
        }
        let alias = format!("n{}", aliases.len());
        writeln!(out, "  {}[\"{}\"]", alias, escape_mermaid_label(&edge.leaf)).unwrap();
        aliases.insert(edge.leaf.as_str(), alias);
    }
    for edge in &graph.edges {
        if let (Some(from), Some(to)) = (
            aliases.get(edge.root.as_str()),
            aliases.get(edge.leaf.as_str()),
        ) {
            writeln!(out, "  {} --> {}", from, to).unwrap();
        }
    }

    out
}
