use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::binding::RegexChain;
use crate::builder::BuildOptions;
use crate::provider::lsp::DEFAULT_COMMAND;

/// Default seconds to wait for the language server's initial analysis
pub const DEFAULT_LSP_SETTLE_SECS: u64 = 30;

/// Default port for `serve`
pub const DEFAULT_PORT: u16 = 3100;

/// Where symbols and references come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Regex declarations and whole-word references, no external tools.
    /// Only classes declared under the root are found.
    #[default]
    Lexical,
    /// A language server over stdio
    Lsp,
    /// A recorded JSON snapshot
    Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CmdgraphConfig {
    pub root: Option<String>,
    pub class_name: Option<String>,
    pub extension: Option<String>,
    pub construction_marker: Option<String>,
    pub binding_window: Option<u32>,
    pub binding_patterns: Option<Vec<String>>,
    pub backend: Option<BackendKind>,
    pub snapshot: Option<String>,
    pub lsp_command: Option<Vec<String>>,
    pub lsp_settle_secs: Option<u64>,
    pub port: Option<u16>,
}

impl CmdgraphConfig {
    /// Config written by `init`: every field spelled out with its default
    pub fn with_defaults() -> Self {
        let options = BuildOptions::default();
        Self {
            root: Some(".".to_string()),
            class_name: Some(options.class_name),
            extension: Some(options.extension),
            construction_marker: Some(options.construction_marker),
            binding_window: Some(options.binding_window),
            binding_patterns: None,
            backend: Some(BackendKind::default()),
            snapshot: None,
            lsp_command: Some(DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect()),
            lsp_settle_secs: Some(DEFAULT_LSP_SETTLE_SECS),
            port: Some(DEFAULT_PORT),
        }
    }

    /// Builder options, defaults filled in
    pub fn build_options(&self) -> BuildOptions {
        let defaults = BuildOptions::default();
        BuildOptions {
            class_name: self.class_name.clone().unwrap_or(defaults.class_name),
            extension: self
                .extension
                .as_deref()
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or(defaults.extension),
            construction_marker: self
                .construction_marker
                .clone()
                .unwrap_or(defaults.construction_marker),
            binding_window: self.binding_window.unwrap_or(defaults.binding_window),
        }
    }

    /// Binding inference chain; the built-in chain unless patterns are configured
    pub fn inference(&self) -> crate::Result<RegexChain> {
        match &self.binding_patterns {
            Some(patterns) if !patterns.is_empty() => RegexChain::from_patterns(patterns.as_slice()),
            _ => Ok(RegexChain::new()),
        }
    }

    pub fn lsp_command(&self) -> Vec<String> {
        match &self.lsp_command {
            Some(command) if !command.is_empty() => command.clone(),
            _ => DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn lsp_settle(&self) -> Duration {
        Duration::from_secs(self.lsp_settle_secs.unwrap_or(DEFAULT_LSP_SETTLE_SECS))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("cmdgraph.toml")
}

pub fn default_snapshot_path_in(base: &Path) -> PathBuf {
    base.join(".cmdgraph").join("snapshot.json")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<CmdgraphConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CmdgraphConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CmdgraphConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn ensure_gitignore(project_root: &Path) -> anyhow::Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = ".cmdgraph/";

    let mut content = String::new();
    if gitignore_path.exists() {
        content = std::fs::read_to_string(&gitignore_path)?;
        if content.lines().any(|line| line.trim() == entry) {
            return Ok(());
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}
