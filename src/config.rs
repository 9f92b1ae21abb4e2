//! Language-server configuration.
//!
//! [`ServerConfig`] is the interface the connection consumes from whatever
//! layer owns settings: which executable to run, the project root, the
//! client capabilities to advertise, and which language ids the server
//! handles. Profile storage is out of scope; callers construct one of
//! these however they persist their settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};

/// Configuration for one language-server connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Executable to spawn, resolved via `PATH` or given absolutely.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Project root; becomes the `rootUri` and the single workspace folder.
    pub workspace_root: PathBuf,
    /// Client capabilities advertised in the `initialize` request.
    pub capabilities: Value,
    /// Language ids this server handles. Documents whose extension maps to
    /// an id outside this list are opened as `plaintext`.
    pub language_ids: Vec<String>,
    /// Deadline for the `initialize` handshake.
    pub init_timeout: Duration,
    /// Optional per-request deadline; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "ccls".to_string(),
            args: Vec::new(),
            workspace_root: PathBuf::from("."),
            capabilities: default_capabilities(),
            language_ids: vec!["c".to_string(), "cpp".to_string()],
            init_timeout: Duration::from_secs(30),
            request_timeout: None,
        }
    }
}

impl ServerConfig {
    /// The language id sent in `textDocument/didOpen` for a document.
    ///
    /// The extension maps through a table of well-known ids; an extension
    /// that is itself a configured id (e.g. `zig`) is accepted verbatim.
    pub fn language_id_for(&self, path: &Path) -> String {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let candidate = known_language_id(extension).unwrap_or(extension);

        if !candidate.is_empty()
            && (self.language_ids.is_empty() || self.language_ids.iter().any(|id| id == candidate))
        {
            candidate.to_string()
        } else {
            "plaintext".to_string()
        }
    }
}

fn known_language_id(extension: &str) -> Option<&'static str> {
    Some(match extension {
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
        "rs" => "rust",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "java" => "java",
        _ => return None,
    })
}

/// The client capabilities advertised by default: the document
/// synchronization, navigation and completion features this crate issues,
/// plus the workspace requests it answers.
pub fn default_capabilities() -> Value {
    json!({
        "textDocument": {
            "synchronization": {
                "didSave": true,
                "willSave": false,
                "willSaveWaitUntil": false
            },
            "definition": { "linkSupport": true },
            "references": {},
            "hover": {
                "contentFormat": ["markdown", "plaintext"]
            },
            "completion": {
                "completionItem": {
                    "snippetSupport": false,
                    "documentationFormat": ["markdown", "plaintext"]
                },
                "contextSupport": true
            },
            "publishDiagnostics": { "relatedInformation": true }
        },
        "window": { "workDoneProgress": true },
        "workspace": {
            "configuration": true,
            "workspaceFolders": true
        }
    })
}
