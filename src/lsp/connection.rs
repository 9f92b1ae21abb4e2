//! Language-server process supervision and the connection state machine.
//!
//! A [`Connection`] owns the spawned language-server subprocess, its pipes,
//! and the background dispatcher task reading from it. The stderr stream is
//! drained on an independent task purely for logging; failures there never
//! affect the main connection.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::LspError;
use crate::lsp::LspResult;
use crate::rpc::{Endpoint, HandlerTable};

/// Lifecycle of one language-server connection.
///
/// Transitions run strictly forward:
/// `Uninitialized → Starting → Handshaking → Ready → ShuttingDown → Closed`,
/// except that `Closed` is entered directly from any state when the
/// dispatcher observes end-of-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No process has been spawned yet.
    Uninitialized = 0,
    /// The process is spawned and the dispatcher loop is running.
    Starting = 1,
    /// The `initialize` request is in flight.
    Handshaking = 2,
    /// Normal operation; requests and notifications are permitted.
    Ready = 3,
    /// A graceful shutdown is in progress.
    ShuttingDown = 4,
    /// Terminal. All pending calls were invalidated on entry.
    Closed = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Starting,
            2 => Self::Handshaking,
            3 => Self::Ready,
            4 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting-down",
            Self::Closed => "closed",
        })
    }
}

/// Shared, atomically updated connection state. Mutated only by the
/// supervisor and the dispatcher-exit watcher.
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// One connection to a language server.
pub struct Connection {
    endpoint: Endpoint,
    state: Arc<StateCell>,
    child: Mutex<Option<Child>>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Spawns the configured executable and starts the dispatcher loop.
    ///
    /// The returned connection is in the `Starting` state; run
    /// [`Connection::initialize`] before issuing requests.
    pub fn spawn(command: &str, args: &[String], workspace_root: &Path) -> LspResult<Self> {
        info!(command, ?args, root = %workspace_root.display(), "starting language server");

        let mut child = Command::new(command)
            .args(args)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::SpawnFailed(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::SpawnFailed("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::SpawnFailed("failed to capture stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        Ok(Self::start(BufReader::new(stdout), stdin, Some(child)))
    }

    /// Attaches to an already-connected byte stream (a socket, or an
    /// in-memory pipe in tests) instead of spawning a process.
    ///
    /// Socket transports are framed identically to stdio, so everything
    /// past the stream halves behaves the same.
    pub fn attach(
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::start(reader, writer, None)
    }

    fn start(
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        child: Option<Child>,
    ) -> Self {
        let endpoint = Endpoint::new(reader, writer, default_handlers());
        let state = Arc::new(StateCell::new(ConnectionState::Starting));

        let loop_endpoint = endpoint.clone();
        let loop_state = Arc::clone(&state);
        let loop_task = tokio::spawn(async move {
            loop_endpoint.run().await;
            loop_state.set(ConnectionState::Closed);
            debug!("dispatcher loop finished, connection closed");
        });

        Self {
            endpoint,
            state,
            child: Mutex::new(child),
            loop_task: Mutex::new(Some(loop_task)),
        }
    }

    /// Performs the `initialize`/`initialized` handshake.
    ///
    /// The `initialize` result must be received before the `initialized`
    /// notification is sent; only then does the connection become `Ready`.
    /// Returns the server's initialize result (capabilities included).
    pub async fn initialize(&self, params: Value) -> LspResult<Value> {
        match self.state.get() {
            ConnectionState::Starting => {}
            other => {
                return Err(LspError::InitializationFailed(format!(
                    "handshake attempted in state {other}"
                )));
            }
        }
        self.state.set(ConnectionState::Handshaking);

        let result = self
            .endpoint
            .call("initialize", params)
            .await
            .map_err(|e| LspError::InitializationFailed(e.to_string()))?;

        self.endpoint
            .notify("initialized", json!({}))
            .await
            .map_err(|e| LspError::InitializationFailed(e.to_string()))?;

        self.state.set(ConnectionState::Ready);
        info!("language server handshake complete");
        Ok(result)
    }

    /// Sends a request and waits for its response.
    ///
    /// Fails with [`LspError::NotReady`] unless the handshake completed;
    /// calls are not queued.
    pub async fn call(&self, method: &str, params: Value) -> LspResult<Value> {
        self.require_ready()?;
        Ok(self.endpoint.call(method, params).await?)
    }

    /// Like [`Connection::call`], with an optional deadline.
    ///
    /// `None` preserves the unbounded default: the caller blocks until the
    /// response arrives or the connection closes.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        limit: Option<Duration>,
    ) -> LspResult<Value> {
        self.require_ready()?;
        match limit {
            None => Ok(self.endpoint.call(method, params).await?),
            Some(limit) => match tokio::time::timeout(limit, self.endpoint.call(method, params)).await
            {
                Ok(outcome) => Ok(outcome?),
                Err(_) => Err(LspError::Timeout(limit)),
            },
        }
    }

    /// Sends a notification; never waits for a reply.
    pub async fn notify(&self, method: &str, params: Value) -> LspResult<()> {
        self.require_ready()?;
        Ok(self.endpoint.notify(method, params).await?)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Runs the graceful shutdown sequence: the `shutdown` request, the
    /// `exit` notification, then stopping the dispatcher and reaping the
    /// subprocess. Idempotent once shutdown has begun.
    pub async fn shutdown(&self) -> LspResult<()> {
        match self.state.get() {
            ConnectionState::ShuttingDown | ConnectionState::Closed => return Ok(()),
            _ => {}
        }
        self.state.set(ConnectionState::ShuttingDown);
        debug!("shutting down language server");

        // The server acknowledges `shutdown` with a null result and exits on
        // the `exit` notification. Tolerate failures here: the server may
        // already be gone, and the kill below still bounds the wait.
        match self.endpoint.call("shutdown", Value::Null).await {
            Ok(Value::Null) => {}
            Ok(other) => warn!(result = %other, "shutdown returned a non-null result"),
            Err(e) => warn!(error = %e, "shutdown request failed"),
        }
        if let Err(e) = self.endpoint.notify("exit", json!({})).await {
            debug!(error = %e, "exit notification failed");
        }

        self.endpoint.stop();
        self.reap_child().await;

        if let Some(task) = self.loop_task.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!("dispatcher loop did not finish in time");
            }
        }

        self.state.set(ConnectionState::Closed);
        Ok(())
    }

    fn require_ready(&self) -> LspResult<()> {
        let state = self.state.get();
        if state == ConnectionState::Ready {
            Ok(())
        } else {
            Err(LspError::NotReady(state))
        }
    }

    async fn reap_child(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "language server exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to await language server exit"),
            Err(_) => {
                warn!("language server did not exit, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill language server");
                }
            }
        }
    }
}

/// Handlers for the server-initiated methods every connection answers.
///
/// `workspace/configuration` and `window/workDoneProgress/create` get a
/// benign null result; `$/progress` is informational and only logged.
fn default_handlers() -> HandlerTable {
    HandlerTable::new()
        .on_request("workspace/configuration", |params| {
            debug!(?params, "answering workspace/configuration with null");
            Ok(Value::Null)
        })
        .on_request("window/workDoneProgress/create", |_params| Ok(Value::Null))
        .on_notification("$/progress", |params| {
            trace!(?params, "server progress");
        })
}

/// Logs every stderr line the server writes. Independent of the main
/// connection; a failure here only ends the drain.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "waypost::server_stderr", "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stderr drain failed");
                break;
            }
        }
    }
}
