//! Symbol Graph Builder - Command -> variable -> referencing files
//!
//! Build algorithm:
//! 1. Search the workspace for the class; keep exact-name class matches
//! 2. Re-resolve the first match through its file's document symbols
//! 3. Find references to the class declaration
//! 4. Keep references inside the workspace with the source extension
//! 5. Per reference: skip construction sites, infer the bound variable from
//!    the rest of the line, find references to that variable and emit one
//!    edge per file outside the declaring file
//!
//! Every provider call may come back empty; that ends the branch, never the
//! build. Provider errors end the build with an empty graph.

use std::path::Path;
use std::sync::Arc;

use crate::Result;
use crate::binding::{BindingInference, RegexChain};
use crate::graph::{CommandGraph, GraphEdge};
use crate::location::{Location, Position};
use crate::provider::Providers;
use crate::symbol::{SymbolEntry, SymbolKind};

/// Default class whose instances become roots
pub const DEFAULT_CLASS_NAME: &str = "Command";

/// Default source file extension
pub const DEFAULT_EXTENSION: &str = "dart";

/// Text that marks a construction site (`Command.create(...)`)
pub const DEFAULT_CONSTRUCTION_MARKER: &str = ".create";

/// Rest-of-line window used for binding inference, in columns
pub const DEFAULT_BINDING_WINDOW: u32 = 500;

/// Knobs for one build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub class_name: String,
    pub extension: String,
    pub construction_marker: String,
    pub binding_window: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            class_name: DEFAULT_CLASS_NAME.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            construction_marker: DEFAULT_CONSTRUCTION_MARKER.to_string(),
            binding_window: DEFAULT_BINDING_WINDOW,
        }
    }
}

/// Builds a [`CommandGraph`] from provider answers.
#[derive(Clone)]
pub struct SymbolGraphBuilder {
    options: BuildOptions,
    inference: Arc<dyn BindingInference>,
}

impl Default for SymbolGraphBuilder {
    fn default() -> Self {
        Self::new(BuildOptions::default())
    }
}

impl SymbolGraphBuilder {
    /// Builder with the default regex chain
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            inference: Arc::new(RegexChain::new()),
        }
    }

    /// Swap the binding-name inference strategy
    pub fn with_inference(mut self, inference: Arc<dyn BindingInference>) -> Self {
        self.inference = inference;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build the graph for the configured class, never failing.
    ///
    /// Errors are logged and produce an empty graph.
    pub async fn build(&self, workspace_root: &Path, providers: Providers<'_>) -> CommandGraph {
        match self.try_build(workspace_root, providers).await {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!("Error occurred while finding references: {}", e);
                CommandGraph::default()
            }
        }
    }

    /// Build the graph, surfacing provider errors
    pub async fn try_build(
        &self,
        workspace_root: &Path,
        providers: Providers<'_>,
    ) -> Result<CommandGraph> {
        let mut graph = CommandGraph::default();

        let Some(declaration) = self.find_declaration(providers).await? else {
            return Ok(graph);
        };

        let refs = providers
            .references
            .references(&declaration.location.path, declaration.location.start)
            .await?;
        let refs: Vec<Location> = refs
            .into_iter()
            .filter(|r| self.in_workspace(r, workspace_root))
            .collect();
        tracing::debug!(
            "{} references to {} inside {}",
            refs.len(),
            self.options.class_name,
            workspace_root.display()
        );

        for reference in &refs {
            if self.is_construction_site(reference, providers).await? {
                continue;
            }

            let variable = self.infer_binding(reference, providers).await?;
            if !variable.is_empty() {
                for leaf in self.referencing_files(reference, &variable, workspace_root, providers).await? {
                    graph.edges.push(GraphEdge::new(variable.clone(), leaf));
                }
            }
            graph.roots.push(variable);
        }

        Ok(graph)
    }

    /// Steps 1-2: the location-bearing declaration of the class
    async fn find_declaration(&self, providers: Providers<'_>) -> Result<Option<SymbolEntry>> {
        let name = self.options.class_name.as_str();

        let matches = providers.symbols.workspace_symbols(name).await?;
        let Some(first) = matches.iter().find(|s| s.matches(name, SymbolKind::Class)) else {
            tracing::debug!("No class named {} in the workspace", name);
            return Ok(None);
        };
        let Some(first) = first.as_located() else {
            tracing::debug!("Workspace match for {} carries no location", name);
            return Ok(None);
        };

        let doc_symbols = providers
            .symbols
            .document_symbols(&first.location.path)
            .await?;
        let declaration = doc_symbols
            .iter()
            .find(|s| s.matches(name, SymbolKind::Class))
            .and_then(|s| s.as_located());

        match declaration {
            Some(entry) => Ok(Some(entry.clone())),
            None => {
                tracing::debug!(
                    "No located declaration of {} in {}",
                    name,
                    first.location.path
                );
                Ok(None)
            }
        }
    }

    fn in_workspace(&self, location: &Location, workspace_root: &Path) -> bool {
        location.has_extension(&self.options.extension) && location.is_under(workspace_root)
    }

    /// Step 5a: `Command.create` and friends
    async fn is_construction_site(&self, reference: &Location, providers: Providers<'_>) -> Result<bool> {
        let marker = self.options.construction_marker.as_str();
        if marker.is_empty() {
            return Ok(false);
        }
        let width = marker.chars().count() as u32;
        let window = providers
            .text
            .read_range(&reference.path, reference.end, reference.end.offset(width))
            .await?;
        Ok(window == marker)
    }

    /// Step 5b: bound variable name, empty when inference fails
    async fn infer_binding(&self, reference: &Location, providers: Providers<'_>) -> Result<String> {
        let window_end = Position::new(reference.start.line, self.options.binding_window);
        let window = providers
            .text
            .read_range(&reference.path, reference.end, window_end)
            .await?;
        let variable = self.inference.infer(&window).unwrap_or_default();
        if variable.is_empty() {
            tracing::debug!("No binding inferred after {}", reference);
        }
        Ok(variable)
    }

    /// Steps 5c-5d: basenames of files that use `variable` outside its declaring file
    async fn referencing_files(
        &self,
        reference: &Location,
        variable: &str,
        workspace_root: &Path,
        providers: Providers<'_>,
    ) -> Result<Vec<String>> {
        let text = providers.text.text(&reference.path).await?;
        let Some(offset) = text.find(variable) else {
            return Ok(Vec::new());
        };
        let position = crate::provider::offset_to_position(&text, offset);

        let declaring_file = reference.basename().to_lowercase();
        let sub_refs = providers.references.references(&reference.path, position).await?;

        Ok(sub_refs
            .into_iter()
            .filter(|r| self.in_workspace(r, workspace_root))
            .map(|r| r.basename())
            .filter(|leaf| leaf.to_lowercase() != declaring_file)
            .collect())
    }
}
