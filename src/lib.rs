//! # cmdgraph - Command dependency graph
//!
//! Extracts the graph of `Command` instances in a Flutter codebase and the
//! files (widgets) that reference them.
//!
//! cmdgraph provides:
//! - Abstract symbol/reference/text providers with snapshot, lexical and
//!   language-server backends
//! - A graph builder that infers `Command -> variable -> referencing file`
//!   ownership from reference data and text heuristics
//! - A rebuild session with latest-wins semantics, driven by a file watcher
//! - Renderers for the dashboard message, graph elements, DOT and Mermaid

pub mod location;
pub mod symbol;
pub mod binding;
pub mod provider;
pub mod builder;
pub mod graph;
pub mod export;
pub mod session;
pub mod watcher;
pub mod server;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use location::{Location, Position};
pub use symbol::{DocumentSymbol, SymbolEntry, SymbolKind};
pub use binding::{BindingInference, RegexChain};
pub use provider::Providers;
pub use builder::{BuildOptions, SymbolGraphBuilder};
pub use graph::{CommandGraph, GraphEdge, RenderMessage};
pub use session::{run_triggers, RebuildSession, RebuildSource};

/// Result type alias for cmdgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cmdgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid binding pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}
