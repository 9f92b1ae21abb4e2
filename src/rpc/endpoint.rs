//! The dispatcher: a background read loop plus the caller-facing API for
//! issuing calls and notifications.
//!
//! One task per connection runs [`Endpoint::run`] for the connection's
//! lifetime; it is the exclusive reader of the input stream. Each received
//! envelope is classified and acted on:
//!
//! - inbound requests are answered by a registered handler, or with a
//!   `MethodNotFound` error when no handler exists;
//! - inbound notifications are dispatched fire-and-forget;
//! - responses resolve the pending call they correlate with.
//!
//! Handlers run inline on the read loop. The design accepts that a slow
//! handler stalls the loop; handlers are expected to be fast (answering
//! configuration queries and the like) and the alternative would be
//! unbounded concurrent handler tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, trace, warn};

use crate::error::RpcError;
use crate::rpc::channel::RpcChannel;
use crate::rpc::pending::PendingCalls;
use crate::rpc::transport::{Envelope, ErrorObject};

/// Answers a server-initiated request. The returned error object is sent
/// back as the JSON-RPC error response; it never crashes the read loop.
pub type RequestHandler = Box<dyn Fn(Option<Value>) -> Result<Value, ErrorObject> + Send + Sync>;

/// Consumes a server-initiated notification. No response exists for
/// notifications under JSON-RPC.
pub type NotificationHandler = Box<dyn Fn(Option<Value>) + Send + Sync>;

/// Registered handlers for server-initiated methods, populated once at
/// construction and read-only thereafter.
#[derive(Default)]
pub struct HandlerTable {
    requests: HashMap<String, RequestHandler>,
    notifications: HashMap<String, NotificationHandler>,
}

impl HandlerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a request-style method.
    #[must_use]
    pub fn on_request<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<Value, ErrorObject> + Send + Sync + 'static,
    {
        self.requests.insert(method.into(), Box::new(handler));
        self
    }

    /// Registers a handler for a notification-style method.
    #[must_use]
    pub fn on_notification<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        self.notifications.insert(method.into(), Box::new(handler));
        self
    }
}

/// A JSON-RPC endpoint over one connection.
///
/// Cloning is cheap; all clones share the same channel, correlation table
/// and stop flag.
#[derive(Clone)]
pub struct Endpoint {
    channel: Arc<RpcChannel>,
    pending: Arc<PendingCalls>,
    handlers: Arc<HandlerTable>,
    stop: Arc<AtomicBool>,
}

impl Endpoint {
    /// Creates an endpoint over the given stream halves.
    ///
    /// The read loop is not started here; spawn [`Endpoint::run`] on a
    /// background task.
    pub fn new(
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        handlers: HandlerTable,
    ) -> Self {
        Self {
            channel: Arc::new(RpcChannel::new(reader, writer)),
            pending: Arc::new(PendingCalls::new()),
            handlers: Arc::new(handlers),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the read loop until the connection closes or the stop flag is
    /// raised.
    ///
    /// On exit (clean end-of-stream, framing failure, or a failed write)
    /// every still-pending call is failed with
    /// [`RpcError::ConnectionClosed`], so no caller blocks past process
    /// death.
    pub async fn run(&self) {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!("stop flag observed, leaving read loop");
                break;
            }

            let envelope = match self.channel.recv().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    debug!("server closed the stream");
                    break;
                }
                Err(e) => {
                    // Framing desync cannot be resynchronized; close instead
                    // of attempting partial-frame recovery.
                    error!(error = %e, "transport failure, closing connection");
                    break;
                }
            };

            match envelope {
                Envelope::Request { id, method, params } => {
                    if let Err(e) = self.handle_request(id, &method, params).await {
                        error!(error = %e, method = %method, "failed to answer inbound request");
                        break;
                    }
                }
                Envelope::Notification { method, params } => {
                    self.handle_notification(&method, params);
                }
                Envelope::Response { id, result, error } => {
                    self.handle_response(id, result, error).await;
                }
            }
        }

        self.stop.store(true, Ordering::SeqCst);
        self.pending.invalidate_all().await;
    }

    /// Raises the stop flag. The loop observes it before its next read.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Sends a request and waits for its response.
    ///
    /// There is no deadline here: a caller blocks until the dispatcher
    /// resolves its id or the connection closes. Deadlines are layered on
    /// by the caller where wanted.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if self.stop.load(Ordering::SeqCst) {
            return Err(RpcError::ConnectionClosed);
        }

        let (id, reply) = self.pending.register().await;
        trace!(method, id, "sending request");

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(e) = self.channel.send(&message).await {
            self.pending.discard(id).await;
            return Err(e);
        }

        // The loop may have invalidated the table before this call
        // registered; an entry that is still present at this point would
        // never be woken.
        if self.stop.load(Ordering::SeqCst) && self.pending.discard(id).await {
            return Err(RpcError::ConnectionClosed);
        }

        match reply.await {
            Ok(outcome) => outcome,
            // The dispatcher dropped the sender without resolving; only
            // possible when the connection tore down.
            Err(_) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Sends a notification; never waits for a reply.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        trace!(method, "sending notification");
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.channel.send(&message).await
    }

    async fn handle_request(
        &self,
        id: Value,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), RpcError> {
        let Some(handler) = self.handlers.requests.get(method) else {
            warn!(method, "no handler for inbound request");
            return self
                .respond(id, None, Some(ErrorObject::method_not_found(method)))
                .await;
        };

        trace!(method, "dispatching inbound request");
        match handler(params) {
            Ok(result) => self.respond(id, Some(result), None).await,
            Err(e) => {
                warn!(method, code = e.code, "inbound request handler failed");
                self.respond(id, None, Some(e)).await
            }
        }
    }

    fn handle_notification(&self, method: &str, params: Option<Value>) {
        match self.handlers.notifications.get(method) {
            Some(handler) => {
                trace!(method, "dispatching inbound notification");
                handler(params);
            }
            None => debug!(method, "ignoring unhandled notification"),
        }
    }

    async fn handle_response(&self, id: Option<Value>, result: Option<Value>, error: Option<ErrorObject>) {
        let Some(id) = id.as_ref().and_then(Value::as_u64) else {
            warn!(?id, "dropping response with missing or non-integer id");
            return;
        };

        let reply = match error {
            Some(e) => Err(RpcError::Server {
                code: e.code,
                message: e.message,
                data: e.data,
            }),
            None => Ok(result.unwrap_or(Value::Null)),
        };
        self.pending.resolve(id, reply).await;
    }

    async fn respond(
        &self,
        id: Value,
        result: Option<Value>,
        error: Option<ErrorObject>,
    ) -> Result<(), RpcError> {
        let mut message = json!({
            "jsonrpc": "2.0",
            "id": id,
        });
        // `result` and `error` are mutually exclusive on the wire; omit the
        // absent one entirely rather than sending null.
        if let Some(fields) = message.as_object_mut() {
            match (result, error) {
                (_, Some(e)) => {
                    fields.insert("error".into(), serde_json::to_value(e).map_err(RpcError::Encode)?);
                }
                (r, None) => {
                    fields.insert("result".into(), r.unwrap_or(Value::Null));
                }
            }
        }
        self.channel.send(&message).await
    }
}
