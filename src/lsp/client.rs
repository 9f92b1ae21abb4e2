//! The LSP client: spawn a server, complete the handshake, navigate code.
//!
//! # Example
//!
//! ```no_run
//! use waypost::lsp::client::LspClient;
//! use std::path::Path;
//!
//! # async fn example() -> waypost::lsp::LspResult<()> {
//! let client = LspClient::builder()
//!     .server_command("clangd")
//!     .workspace_root("/path/to/project")
//!     .language_ids(["c", "cpp"])
//!     .build()
//!     .await?;
//!
//! let file = Path::new("/path/to/project/src/sound.c");
//! client.did_open(file).await?;
//!
//! // Positions are 0-based, as the protocol counts them.
//! let definitions = client.goto_definition(file, 26, 25).await?;
//! for location in &definitions {
//!     println!("{}:{}:{}", location.path.display(), location.line, location.column);
//! }
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use lsp_types::{CompletionResponse, Hover};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::LspError;
use crate::lsp::LspResult;
use crate::lsp::connection::{Connection, ConnectionState};
use crate::lsp::types::{self, SourceLocation, path_to_uri, position_params};

/// Builder for constructing an [`LspClient`].
#[derive(Debug, Default)]
pub struct LspClientBuilder {
    config: ServerConfig,
}

impl LspClientBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from an existing configuration.
    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Sets the server command.
    #[must_use]
    pub fn server_command(mut self, command: impl Into<String>) -> Self {
        self.config.command = command.into();
        self
    }

    /// Sets the server arguments.
    #[must_use]
    pub fn server_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = path.into();
        self
    }

    /// Sets the client capabilities advertised during initialization.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Value) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Sets the language ids the server handles.
    #[must_use]
    pub fn language_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.language_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the initialization deadline.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Sets the per-request deadline. Without one, a call that never gets
    /// a response blocks until the connection closes.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Spawns the language server and performs the handshake.
    pub async fn build(self) -> LspResult<LspClient> {
        let mut config = self.config;
        config.workspace_root = config.workspace_root.canonicalize().map_err(|e| {
            LspError::InitializationFailed(format!("failed to canonicalize workspace root: {e}"))
        })?;

        let connection = Connection::spawn(&config.command, &config.args, &config.workspace_root)?;
        LspClient::handshake(connection, config).await
    }

    /// Performs the handshake over an already-connected byte stream
    /// instead of spawning a process.
    pub async fn attach(
        self,
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> LspResult<LspClient> {
        let connection = Connection::attach(reader, writer);
        LspClient::handshake(connection, self.config).await
    }
}

/// A connected, initialized language server.
pub struct LspClient {
    connection: Connection,
    config: ServerConfig,
    server_capabilities: Value,
}

impl LspClient {
    /// Creates a new builder for constructing an LSP client.
    pub fn builder() -> LspClientBuilder {
        LspClientBuilder::new()
    }

    async fn handshake(connection: Connection, config: ServerConfig) -> LspResult<Self> {
        let params = initialize_params(&config)?;

        let result = match tokio::time::timeout(config.init_timeout, connection.initialize(params))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(LspError::Timeout(config.init_timeout)),
        };

        let server_capabilities = result.get("capabilities").cloned().unwrap_or(Value::Null);
        Ok(Self {
            connection,
            config,
            server_capabilities,
        })
    }

    /// The capabilities the server reported during initialization.
    pub fn server_capabilities(&self) -> &Value {
        &self.server_capabilities
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Opens a document, reading its text from disk.
    pub async fn did_open(&self, path: &Path) -> LspResult<()> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            LspError::DocumentRead(format!("failed to read '{}': {}", path.display(), e))
        })?;
        self.did_open_text(path, &text).await
    }

    /// Opens a document with the given text, for callers that
    /// hold the current buffer contents themselves.
    pub async fn did_open_text(&self, path: &Path, text: &str) -> LspResult<()> {
        let uri = path_to_uri(path)?;
        let language_id = self.config.language_id_for(path);
        debug!(uri = %uri, language_id = %language_id, "opening document");

        self.connection
            .notify(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": uri,
                        "languageId": language_id,
                        "version": 1,
                        "text": text,
                    }
                }),
            )
            .await
    }

    /// Jumps to the definition of the symbol at a position.
    ///
    /// `line` and `character` are 0-based. Returned columns are 1-based.
    pub async fn goto_definition(
        &self,
        path: &Path,
        line: u32,
        character: u32,
    ) -> LspResult<Vec<SourceLocation>> {
        let uri = path_to_uri(path)?;
        let response = self
            .request("textDocument/definition", position_params(&uri, line, character))
            .await?;
        types::definition_locations(response)
    }

    /// Finds references to the symbol at a position.
    ///
    /// `line` and `character` are 0-based. Returned columns keep the
    /// server's 0-based numbering.
    pub async fn find_references(
        &self,
        path: &Path,
        line: u32,
        character: u32,
        include_declaration: bool,
    ) -> LspResult<Vec<SourceLocation>> {
        let uri = path_to_uri(path)?;
        let mut params = position_params(&uri, line, character);
        if let Some(fields) = params.as_object_mut() {
            fields.insert(
                "context".to_string(),
                json!({ "includeDeclaration": include_declaration }),
            );
        }

        let response = self.request("textDocument/references", params).await?;
        types::reference_locations(response)
    }

    /// Hover documentation for the symbol at a position, passed through
    /// as the server sent it.
    pub async fn hover(&self, path: &Path, line: u32, character: u32) -> LspResult<Option<Hover>> {
        let uri = path_to_uri(path)?;
        let response = self
            .request("textDocument/hover", position_params(&uri, line, character))
            .await?;
        serde_json::from_value(response)
            .map_err(|e| LspError::ParseError(format!("hover response: {e}")))
    }

    /// Completion candidates at a position, passed through as the server
    /// sent them.
    pub async fn completion(
        &self,
        path: &Path,
        line: u32,
        character: u32,
    ) -> LspResult<Option<CompletionResponse>> {
        let uri = path_to_uri(path)?;
        let mut params = position_params(&uri, line, character);
        if let Some(fields) = params.as_object_mut() {
            // triggerKind 1: explicitly invoked, as opposed to typed-through
            fields.insert("context".to_string(), json!({ "triggerKind": 1 }));
        }

        let response = self.request("textDocument/completion", params).await?;
        serde_json::from_value(response)
            .map_err(|e| LspError::ParseError(format!("completion response: {e}")))
    }

    /// Shuts down the language server gracefully.
    pub async fn shutdown(&self) -> LspResult<()> {
        self.connection.shutdown().await
    }

    async fn request(&self, method: &str, params: Value) -> LspResult<Value> {
        self.connection
            .call_with_timeout(method, params, self.config.request_timeout)
            .await
    }
}

/// Builds the `initialize` request parameters from the configuration:
/// process id, root URI, advertised capabilities, workspace folders and
/// trace level.
fn initialize_params(config: &ServerConfig) -> LspResult<Value> {
    let root_uri = path_to_uri(&config.workspace_root)?;
    let folder_name = config
        .workspace_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace");

    Ok(json!({
        "processId": std::process::id(),
        "clientInfo": {
            "name": "waypost",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "rootUri": root_uri,
        "capabilities": config.capabilities,
        "trace": "off",
        "workspaceFolders": [{ "name": folder_name, "uri": root_uri }],
    }))
}
