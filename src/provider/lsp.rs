//! Language server backend
//!
//! Spawns a language server (the Dart analysis server by default) and talks
//! JSON-RPC to it over stdio with `Content-Length` framing. One request is in
//! flight at a time; server-initiated requests get a minimal reply so the
//! server never blocks on us, notifications are dropped.
//!
//! The client offers UTF-32 columns. A server that keeps the UTF-16 default
//! gets its columns converted against the file text on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use lsp_types::request::Request as LspRequest;
use lsp_types::notification::Notification as LspNotification;
use lsp_types::{
    ClientCapabilities, DocumentSymbolParams, DocumentSymbolResponse, GeneralClientCapabilities,
    InitializeParams, InitializedParams, OneOf, PartialResultParams, PositionEncodingKind,
    ReferenceContext, ReferenceParams,
    TextDocumentIdentifier, TextDocumentPositionParams, Url, WorkDoneProgressParams,
    WorkspaceFolder, WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{
    char_to_utf16_column, line_text, utf16_to_char_column, DiskText, ReferenceProvider,
    SymbolProvider, TextSource,
};
use crate::location::{Location, Position};
use crate::symbol::{DocumentSymbol, SymbolEntry, SymbolKind};
use crate::{Error, Result};

/// Default server command line
pub const DEFAULT_COMMAND: &[&str] = &["dart", "language-server", "--protocol=lsp"];

/// Column unit agreed on during initialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnUnit {
    Utf16,
    Utf32,
}

/// Converts columns between the server's unit and characters, reading each
/// file at most once per response
struct ColumnMapper {
    unit: ColumnUnit,
    texts: HashMap<String, Option<String>>,
}

impl ColumnMapper {
    fn new(unit: ColumnUnit) -> Self {
        Self {
            unit,
            texts: HashMap::new(),
        }
    }

    async fn line(&mut self, path: &str, line: u32) -> Option<&str> {
        if !self.texts.contains_key(path) {
            let text = match DiskText.text(path).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::debug!("Keeping server columns for {}: {}", path, e);
                    None
                }
            };
            self.texts.insert(path.to_string(), text);
        }
        self.texts
            .get(path)
            .and_then(|text| text.as_deref())
            .and_then(|text| line_text(text, line))
    }

    /// Server position to character position
    async fn char_position(&mut self, path: &str, position: Position) -> Position {
        if self.unit == ColumnUnit::Utf32 {
            return position;
        }
        match self.line(path, position.line).await {
            Some(line) => Position::new(position.line, utf16_to_char_column(line, position.character)),
            None => position,
        }
    }

    /// Character position to server position
    async fn server_position(&mut self, path: &str, position: Position) -> lsp_types::Position {
        let character = match self.unit {
            ColumnUnit::Utf32 => position.character,
            ColumnUnit::Utf16 => match self.line(path, position.line).await {
                Some(line) => char_to_utf16_column(line, position.character),
                None => position.character,
            },
        };
        lsp_types::Position::new(position.line, character)
    }

    async fn location(&mut self, location: &lsp_types::Location) -> Location {
        let raw = from_lsp_location(location);
        let start = self.char_position(&raw.path, raw.start).await;
        let end = self.char_position(&raw.path, raw.end).await;
        Location::new(raw.path, start, end)
    }

    async fn symbol_information(&mut self, info: &lsp_types::SymbolInformation) -> DocumentSymbol {
        DocumentSymbol::Located(SymbolEntry::new(
            info.name.clone(),
            SymbolKind::from(info.kind),
            self.location(&info.location).await,
        ))
    }
}

struct Connection {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A running language server.
pub struct LspClient {
    conn: Mutex<Connection>,
    child: Mutex<Child>,
    next_id: AtomicI64,
    columns: OnceLock<ColumnUnit>,
}

impl LspClient {
    /// Spawn `command` and run the initialize handshake for `root`
    pub async fn start(command: &[String], root: &Path) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::MissingDependency("empty language server command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::MissingDependency(format!(
                    "language server `{}` was not found on PATH",
                    program
                )),
                _ => Error::Io(e),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Protocol("language server stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Protocol("language server stdout unavailable".to_string()))?;

        let client = Self {
            conn: Mutex::new(Connection {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            child: Mutex::new(child),
            next_id: AtomicI64::new(1),
            columns: OnceLock::new(),
        };
        client.initialize(root).await?;
        Ok(client)
    }

    async fn initialize(&self, root: &Path) -> Result<()> {
        let root = root.canonicalize()?;
        let uri = path_to_url(&root)?;
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(uri.clone()),
            workspace_folders: Some(vec![WorkspaceFolder { uri, name }]),
            capabilities: ClientCapabilities {
                general: Some(GeneralClientCapabilities {
                    position_encodings: Some(vec![
                        PositionEncodingKind::UTF32,
                        PositionEncodingKind::UTF16,
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            initialization_options: Some(json!({ "onlyAnalyzeProjectsWithOpenFiles": false })),
            ..Default::default()
        };

        let result = self.request::<lsp_types::request::Initialize>(params).await?;
        let unit = match result.capabilities.position_encoding {
            Some(kind) if kind == PositionEncodingKind::UTF32 => ColumnUnit::Utf32,
            _ => ColumnUnit::Utf16,
        };
        let _ = self.columns.set(unit);
        tracing::debug!(
            "Language server initialized ({:?} columns): {}",
            unit,
            result
                .server_info
                .map(|info| info.name)
                .unwrap_or_else(|| "unknown".to_string())
        );
        self.notify::<lsp_types::notification::Initialized>(InitializedParams {})
            .await
    }

    fn column_mapper(&self) -> ColumnMapper {
        ColumnMapper::new(self.columns.get().copied().unwrap_or(ColumnUnit::Utf16))
    }

    /// Wait until the server reports it finished analyzing, or `timeout` elapses
    pub async fn settle(&self, timeout: Duration) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let wait = async {
            loop {
                let message = read_message(&mut conn.stdout).await?;
                if message.get("method").and_then(Value::as_str) == Some("$/analyzerStatus")
                    && message["params"]["isAnalyzing"] == Value::Bool(false)
                {
                    return Ok::<_, Error>(());
                }
                if message.get("id").is_some() && message.get("method").is_some() {
                    reply_to_server(&mut conn.stdin, &message).await?;
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!("Language server still busy after {:?}, continuing", timeout);
                Ok(())
            }
        }
    }

    /// Polite shutdown: `shutdown` request, `exit` notification, reap
    pub async fn shutdown(&self) -> Result<()> {
        self.request::<lsp_types::request::Shutdown>(()).await?;
        self.notify::<lsp_types::notification::Exit>(()).await?;
        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => child.kill().await?,
        }
        Ok(())
    }

    async fn request<R: LspRequest>(&self, params: R::Params) -> Result<R::Result> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": R::METHOD,
            "params": params,
        });

        let mut conn = self.conn.lock().await;
        write_message(&mut conn.stdin, &payload).await?;

        loop {
            let message = read_message(&mut conn.stdout).await?;
            match (message.get("id"), message.get("method")) {
                // Server -> client request
                (Some(_), Some(_)) => reply_to_server(&mut conn.stdin, &message).await?,
                (Some(resp_id), None) if resp_id.as_i64() == Some(id) => {
                    if let Some(error) = message.get("error") {
                        return Err(Error::Provider(format!(
                            "{} failed: {}",
                            R::METHOD,
                            error.get("message").and_then(Value::as_str).unwrap_or("unknown error")
                        )));
                    }
                    let result = message.get("result").cloned().unwrap_or(Value::Null);
                    return Ok(serde_json::from_value(result)?);
                }
                // Notifications and stale responses
                _ => {}
            }
        }
    }

    async fn notify<N: LspNotification>(&self, params: N::Params) -> Result<()> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": N::METHOD,
            "params": params,
        });
        let mut conn = self.conn.lock().await;
        write_message(&mut conn.stdin, &payload).await
    }
}

async fn write_message(stdin: &mut ChildStdin, payload: &Value) -> Result<()> {
    let body = serde_json::to_vec(payload)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    stdin.write_all(header.as_bytes()).await?;
    stdin.write_all(&body).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_message(stdout: &mut BufReader<ChildStdout>) -> Result<Value> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        if stdout.read_line(&mut line).await? == 0 {
            return Err(Error::Protocol("language server closed its output".to_string()));
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = Some(value.trim().parse().map_err(|_| {
                    Error::Protocol(format!("bad Content-Length header: {}", line))
                })?);
            }
        }
    }

    let len = content_length
        .ok_or_else(|| Error::Protocol("message without Content-Length".to_string()))?;
    let mut body = vec![0u8; len];
    stdout.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Minimal answer to a server-initiated request
async fn reply_to_server(stdin: &mut ChildStdin, message: &Value) -> Result<()> {
    let result = match message.get("method").and_then(Value::as_str) {
        Some("workspace/configuration") => {
            let items = message["params"]["items"].as_array().map(Vec::len).unwrap_or(0);
            Value::Array(vec![Value::Null; items])
        }
        _ => Value::Null,
    };
    let payload = json!({
        "jsonrpc": "2.0",
        "id": message["id"].clone(),
        "result": result,
    });
    write_message(stdin, &payload).await
}

fn path_to_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|_| Error::Provider(format!("{} cannot be expressed as a file URI", path.display())))
}

fn url_to_path(url: &Url) -> String {
    url.to_file_path()
        .map(|p: PathBuf| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| url.path().to_string())
}

fn from_lsp_position(position: lsp_types::Position) -> Position {
    Position::new(position.line, position.character)
}

fn from_lsp_location(location: &lsp_types::Location) -> Location {
    Location::new(
        url_to_path(&location.uri),
        from_lsp_position(location.range.start),
        from_lsp_position(location.range.end),
    )
}

/// Use sites only. With the declaration included, a class declared inside
/// the workspace would add one empty root.
fn reference_params(uri: Url, position: lsp_types::Position) -> ReferenceParams {
    ReferenceParams {
        text_document_position: TextDocumentPositionParams::new(
            TextDocumentIdentifier::new(uri),
            position,
        ),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
        context: ReferenceContext {
            include_declaration: false,
        },
    }
}

/// Flatten a nested outline, parents before children
fn flatten_outline(symbols: &[lsp_types::DocumentSymbol], out: &mut Vec<DocumentSymbol>) {
    for symbol in symbols {
        out.push(DocumentSymbol::Outline {
            name: symbol.name.clone(),
            kind: SymbolKind::from(symbol.kind),
            start: from_lsp_position(symbol.selection_range.start),
            end: from_lsp_position(symbol.selection_range.end),
        });
        if let Some(children) = &symbol.children {
            flatten_outline(children, out);
        }
    }
}

#[async_trait]
impl SymbolProvider for LspClient {
    async fn workspace_symbols(&self, query: &str) -> Result<Vec<DocumentSymbol>> {
        let params = WorkspaceSymbolParams {
            query: query.to_string(),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response = self
            .request::<lsp_types::request::WorkspaceSymbolRequest>(params)
            .await?;

        let mut columns = self.column_mapper();
        let mut out = Vec::new();
        match response {
            None => {}
            Some(WorkspaceSymbolResponse::Flat(infos)) => {
                for info in &infos {
                    out.push(columns.symbol_information(info).await);
                }
            }
            Some(WorkspaceSymbolResponse::Nested(symbols)) => {
                for symbol in &symbols {
                    // No range: cannot anchor a references query on it
                    if let OneOf::Left(location) = &symbol.location {
                        out.push(DocumentSymbol::Located(SymbolEntry::new(
                            symbol.name.clone(),
                            SymbolKind::from(symbol.kind),
                            columns.location(location).await,
                        )));
                    }
                }
            }
        }
        Ok(out)
    }

    async fn document_symbols(&self, path: &str) -> Result<Vec<DocumentSymbol>> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier::new(path_to_url(Path::new(path))?),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response = self
            .request::<lsp_types::request::DocumentSymbolRequest>(params)
            .await?;

        let mut columns = self.column_mapper();
        let mut out = Vec::new();
        match response {
            None => {}
            Some(DocumentSymbolResponse::Flat(infos)) => {
                for info in &infos {
                    out.push(columns.symbol_information(info).await);
                }
            }
            Some(DocumentSymbolResponse::Nested(symbols)) => {
                flatten_outline(&symbols, &mut out);
                for symbol in &mut out {
                    if let DocumentSymbol::Outline { start, end, .. } = symbol {
                        *start = columns.char_position(path, *start).await;
                        *end = columns.char_position(path, *end).await;
                    }
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ReferenceProvider for LspClient {
    async fn references(&self, path: &str, position: Position) -> Result<Vec<Location>> {
        let mut columns = self.column_mapper();
        let params = reference_params(
            path_to_url(Path::new(path))?,
            columns.server_position(path, position).await,
        );
        let response = self.request::<lsp_types::request::References>(params).await?;

        let mut out = Vec::new();
        for location in response.unwrap_or_default() {
            out.push(columns.location(&location).await);
        }
        Ok(out)
    }
}

#[async_trait]
impl TextSource for LspClient {
    /// Saved file contents; unsaved editor buffers do not exist here
    async fn text(&self, path: &str) -> Result<String> {
        DiskText.text(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_server_binary() {
        let dir = tempfile::tempdir().unwrap();
        let command = vec!["cmdgraph-no-such-language-server".to_string()];
        let err = LspClient::start(&command, dir.path()).await.err().unwrap();
        assert!(matches!(err, Error::MissingDependency(_)));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = LspClient::start(&[], dir.path()).await.err().unwrap();
        assert!(matches!(err, Error::MissingDependency(_)));
    }

    #[test]
    fn test_flatten_nested_outline() {
        let json = json!([{
            "name": "HomePage",
            "kind": 5,
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 9, "character": 1}},
            "selectionRange": {"start": {"line": 0, "character": 6}, "end": {"line": 0, "character": 14}},
            "children": [{
                "name": "fetch",
                "kind": 8,
                "range": {"start": {"line": 1, "character": 2}, "end": {"line": 1, "character": 40}},
                "selectionRange": {"start": {"line": 1, "character": 30}, "end": {"line": 1, "character": 35}}
            }]
        }]);
        let symbols: Vec<lsp_types::DocumentSymbol> = serde_json::from_value(json).unwrap();
        let mut out = Vec::new();
        flatten_outline(&symbols, &mut out);

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.as_located().is_none()));
        assert_eq!(out[0].kind(), SymbolKind::Class);
        assert_eq!(out[1].kind(), SymbolKind::Field);
        assert_eq!(out[1].name(), "fetch");
    }

    #[cfg(unix)]
    #[test]
    fn test_location_conversion() {
        let location: lsp_types::Location = serde_json::from_value(json!({
            "uri": "file:///ws/lib/home%20page.dart",
            "range": {"start": {"line": 3, "character": 4}, "end": {"line": 3, "character": 11}}
        }))
        .unwrap();
        let converted = from_lsp_location(&location);
        assert_eq!(converted.path, "/ws/lib/home page.dart");
        assert_eq!(converted.start, Position::new(3, 4));
        assert_eq!(converted.basename(), "home page.dart");
    }

    #[tokio::test]
    async fn test_utf16_columns_follow_file_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.dart");
        std::fs::write(&path, "Text('\u{1F600}'); final Command> save;\n").unwrap();
        let path = path.to_string_lossy().to_string();

        // "Command" starts at character 17, which is UTF-16 unit 18
        let mut columns = ColumnMapper::new(ColumnUnit::Utf16);
        assert_eq!(
            columns.char_position(&path, Position::new(0, 18)).await,
            Position::new(0, 17)
        );
        assert_eq!(
            columns.server_position(&path, Position::new(0, 17)).await,
            lsp_types::Position::new(0, 18)
        );

        let mut columns = ColumnMapper::new(ColumnUnit::Utf32);
        assert_eq!(
            columns.char_position(&path, Position::new(0, 18)).await,
            Position::new(0, 18)
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_keeps_server_columns() {
        let mut columns = ColumnMapper::new(ColumnUnit::Utf16);
        let position = columns.char_position("/no/such/page.dart", Position::new(2, 7)).await;
        assert_eq!(position, Position::new(2, 7));
    }

    #[test]
    fn test_reference_query_excludes_declaration() {
        let uri = Url::parse("file:///ws/lib/command.dart").unwrap();
        let params = reference_params(uri, lsp_types::Position::new(0, 6));
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["context"]["includeDeclaration"], false);
        assert_eq!(json["position"]["character"], 6);
    }
}
