use tabled::{settings::Style, Table, Tabled};

use crate::graph::CommandGraph;

/// Label for roots whose binding could not be inferred
pub const UNNAMED: &str = "(unnamed)";

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
pub struct CommandRow {
    #[tabled(rename = "Command")]
    pub command: String,
    #[tabled(rename = "Referencing files")]
    pub files: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

/// One row per root in build order, then a stats table
pub fn graph_table(graph: &CommandGraph) -> String {
    if graph.roots.is_empty() {
        return "No Command instances found".to_string();
    }

    let rows: Vec<CommandRow> = graph
        .roots
        .iter()
        .map(|root| {
            let leaves: Vec<&str> = graph.leaves_of(root).into_iter().collect();
            CommandRow {
                command: if root.is_empty() { UNNAMED.to_string() } else { root.clone() },
                files: if leaves.is_empty() { "-".to_string() } else { leaves.join(", ") },
            }
        })
        .collect();

    let stats = graph.stats();
    let roots = stats.roots.to_string();
    let unnamed = stats.unnamed_roots.to_string();
    let leaves = stats.leaves.to_string();
    let edges = stats.edges.to_string();
    let edge_collisions = stats.colliding_edge_ids.to_string();
    let node_collisions = stats.colliding_node_ids.to_string();

    format!(
        "{}\n{}",
        Table::new(&rows).with(Style::rounded()),
        stats_table(&[
            ("Commands", &roots),
            ("Unnamed", &unnamed),
            ("Referencing files", &leaves),
            ("Edges", &edges),
            ("Colliding edge ids", &edge_collisions),
            ("Colliding node ids", &node_collisions),
        ])
    )
}
