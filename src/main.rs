//! cmdgraph CLI - Command dependency graph for Flutter codebases

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use cmdgraph::config::{self, BackendKind, CmdgraphConfig};
use cmdgraph::export::{self, OutputFormat};
use cmdgraph::provider::snapshot::SnapshotRecorder;
use cmdgraph::provider::{LexicalIndex, LspClient, Providers, SnapshotIndex};
use cmdgraph::session::RebuildOutcome;
use cmdgraph::ui::{self, Icons, Spinner};
use cmdgraph::watcher;
use cmdgraph::{run_triggers, RebuildSession, RebuildSource, SymbolGraphBuilder};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cmdgraph")]
#[command(version = "0.1.0")]
#[command(about = "Dependency graph of Command instances and the widgets that use them")]
#[command(long_about = r#"
cmdgraph finds every `Command` instance in a Flutter codebase, infers the
variable it is bound to and lists the files that reference that variable.

Example usage:
  cmdgraph graph --format mermaid
  cmdgraph graph --backend lsp --format json
  cmdgraph watch
  cmdgraph serve --port 3100
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to ./cmdgraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root (overrides the config)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Default)]
struct SourceArgs {
    /// Where symbols and references come from.
    ///
    /// `lexical` only sees files under the root. When `Command` is declared
    /// in a dependency (the usual flutter_command setup), use `lsp` or a
    /// snapshot recorded with it.
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,

    /// Snapshot file for the snapshot backend
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Class whose instances become graph roots
    #[arg(long = "class")]
    class_name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph once and print it
    Graph {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },

    /// Rebuild on every change, printing one JSON render message per build
    Watch {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Serve the latest graph over HTTP, rebuilding on change
    Serve {
        #[command(flatten)]
        source: SourceArgs,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Build once and record every provider answer as a snapshot file
    Snapshot {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file (defaults to .cmdgraph/snapshot.json under the root)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a cmdgraph.toml with every option spelled out
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// A started provider backend
enum LoadedBackend {
    Lexical(LexicalIndex),
    Lsp(LspClient),
    Snapshot(SnapshotIndex, PathBuf),
}

impl LoadedBackend {
    async fn load(kind: BackendKind, root: &Path, config: &CmdgraphConfig) -> anyhow::Result<Self> {
        let extension = config.build_options().extension;
        Ok(match kind {
            BackendKind::Lexical => {
                let index = LexicalIndex::scan(root, &extension)?;
                tracing::info!("Indexed {} .{} files", index.file_count(), extension);
                Self::Lexical(index)
            }
            BackendKind::Lsp => {
                let spinner = Spinner::new("Starting language server");
                let client = LspClient::start(&config.lsp_command(), root).await?;
                spinner.set_message("Waiting for analysis");
                client.settle(config.lsp_settle()).await?;
                spinner.finish_and_clear();
                Self::Lsp(client)
            }
            BackendKind::Snapshot => {
                let path = snapshot_path(root, config);
                Self::Snapshot(SnapshotIndex::load(&path)?, path)
            }
        })
    }

    async fn close(self) {
        if let Self::Lsp(client) = self {
            if let Err(e) = client.shutdown().await {
                tracing::debug!("Language server shutdown failed: {}", e);
            }
        }
    }
}

impl RebuildSource for LoadedBackend {
    /// The language server watches the workspace itself
    fn refresh(&mut self) -> cmdgraph::Result<()> {
        match self {
            Self::Lexical(index) => *index = index.rescan()?,
            Self::Lsp(_) => {}
            Self::Snapshot(index, path) => *index = SnapshotIndex::load(path)?,
        }
        Ok(())
    }

    fn providers(&self) -> Providers<'_> {
        match self {
            Self::Lexical(index) => Providers::from_backend(index),
            Self::Lsp(client) => Providers::from_backend(client),
            Self::Snapshot(index, _) => Providers::from_backend(index),
        }
    }
}

fn snapshot_path(root: &Path, config: &CmdgraphConfig) -> PathBuf {
    config
        .snapshot
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| config::default_snapshot_path_in(root))
}

/// Config file values with command-line overrides applied
fn apply_overrides(mut config: CmdgraphConfig, source: &SourceArgs) -> CmdgraphConfig {
    if let Some(backend) = source.backend {
        config.backend = Some(backend);
    }
    if let Some(snapshot) = &source.snapshot {
        config.snapshot = Some(snapshot.display().to_string());
    }
    if let Some(class_name) = &source.class_name {
        config.class_name = Some(class_name.clone());
    }
    config
}

fn resolve_root(cli_root: Option<PathBuf>, config: &CmdgraphConfig) -> anyhow::Result<PathBuf> {
    let root = cli_root
        .or_else(|| config.root.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::canonicalize(&root)
        .map_err(|e| anyhow::anyhow!("workspace root {} is not accessible: {}", root.display(), e))
}

fn make_builder(config: &CmdgraphConfig) -> anyhow::Result<SymbolGraphBuilder> {
    let inference = config.inference()?;
    Ok(SymbolGraphBuilder::new(config.build_options()).with_inference(Arc::new(inference)))
}

/// Rebuild on every watched change until the watcher stops
async fn rebuild_loop(
    session: &RebuildSession,
    backend: &mut LoadedBackend,
    extension: &str,
    on_publish: impl FnMut(&RebuildSession),
) -> anyhow::Result<()> {
    let (_handle, mut triggers) = watcher::start_watcher(session.root(), extension)?;
    let published = run_triggers(session, &mut triggers, backend, on_publish).await;
    tracing::debug!("Watcher closed after {} rebuilds", published);
    Ok(())
}

fn print_message(session: &RebuildSession) {
    match serde_json::to_string(&session.latest().graph.to_message()) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!("Failed to encode render message: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for graph output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let file_config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Graph { source, format } => {
            let config = apply_overrides(file_config, &source);
            let root = resolve_root(cli.root, &config)?;
            let builder = make_builder(&config)?;
            let started = Instant::now();

            let backend = LoadedBackend::load(config.backend.unwrap_or_default(), &root, &config).await?;
            let graph = builder.build(&root, backend.providers()).await;
            backend.close().await;

            println!("{}", export::render(&graph, format)?);
            if format == OutputFormat::Human {
                ui::build_summary(started.elapsed(), &graph.stats());
            }
        }

        Commands::Watch { source } => {
            let config = apply_overrides(file_config, &source);
            let root = resolve_root(cli.root, &config)?;
            let extension = config.build_options().extension;
            let session = RebuildSession::new(&root, make_builder(&config)?);

            let mut backend = LoadedBackend::load(config.backend.unwrap_or_default(), &root, &config).await?;
            if let RebuildOutcome::Published { .. } = session.request_rebuild(backend.providers()).await {
                print_message(&session);
            }

            ui::status(Icons::EYE, "Watching", &root.display().to_string());
            rebuild_loop(&session, &mut backend, &extension, print_message).await?;
            backend.close().await;
        }

        Commands::Serve { source, port } => {
            let config = apply_overrides(file_config, &source);
            let root = resolve_root(cli.root, &config)?;
            let extension = config.build_options().extension;
            let port = port.or(config.port).unwrap_or(config::DEFAULT_PORT);
            let session = Arc::new(RebuildSession::new(&root, make_builder(&config)?));

            let mut backend = LoadedBackend::load(config.backend.unwrap_or_default(), &root, &config).await?;
            session.request_rebuild(backend.providers()).await;

            let mut server = tokio::spawn(cmdgraph::server::start_server(port, session.clone()));
            ui::status(Icons::GLOBE, "Serving", &format!("http://127.0.0.1:{}/graph", port));

            tokio::select! {
                served = &mut server => {
                    served??;
                }
                watched = rebuild_loop(&session, &mut backend, &extension, |_| {}) => {
                    watched?;
                    server.abort();
                }
            }
            backend.close().await;
        }

        Commands::Snapshot { source, output } => {
            let config = apply_overrides(file_config, &source);
            let root = resolve_root(cli.root, &config)?;
            let output = output.unwrap_or_else(|| config::default_snapshot_path_in(&root));
            let builder = make_builder(&config)?;

            let backend = LoadedBackend::load(config.backend.unwrap_or_default(), &root, &config).await?;
            let recorder = SnapshotRecorder::new(backend.providers());
            let graph = builder.build(&root, Providers::from_backend(&recorder)).await;
            let snapshot = recorder.into_index();
            backend.close().await;

            config::ensure_parent_dir(&output)?;
            snapshot.save(&output)?;
            ui::success(&format!("Snapshot written to {}", output.display()));
            eprintln!("{}", snapshot.stats());
            eprintln!("{}", graph.stats());
        }

        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            config::write_config(&path, &CmdgraphConfig::with_defaults(), force)?;
            let root = resolve_root(cli.root, &file_config)?;
            config::ensure_gitignore(&root)?;
            ui::success(&format!("Wrote {}", path.display()));
            ui::info("Next", &ui::dim("cmdgraph graph"));
        }
    }

    Ok(())
}
