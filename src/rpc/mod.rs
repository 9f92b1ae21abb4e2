//! JSON-RPC plumbing for the Language Server Protocol.
//!
//! This module implements the client side of LSP's JSON-RPC transport:
//! - [`transport`]: the wire-framing codec (`Content-Length` headers plus a
//!   UTF-8 JSON payload) and envelope classification
//! - [`channel`]: a full-duplex message channel over a pair of byte streams
//! - [`pending`]: correlation of outstanding calls with their responses
//! - [`endpoint`]: the dispatcher, a background read loop that routes
//!   inbound requests, notifications and responses
//!
//! # Architecture
//!
//! ```text
//! caller ──► Endpoint::call ──► RpcChannel::send ──► stream ──► server
//!                 │                                               │
//!                 ▼                                               ▼
//!          PendingCalls ◄── Endpoint::run ◄── RpcChannel::recv ◄── stream
//! ```
//!
//! A single background task per connection runs [`Endpoint::run`] and is
//! the exclusive reader of the input stream. Any number of caller tasks
//! may issue calls and notifications concurrently; frames are serialized
//! by a write lock inside [`RpcChannel`].

pub mod channel;
pub mod endpoint;
pub mod pending;
pub mod transport;

pub use channel::RpcChannel;
pub use endpoint::{Endpoint, HandlerTable};
pub use transport::{Envelope, ErrorObject};

/// JSON-RPC and LSP error codes, fixed by the protocol.
pub mod codes {
    /// Invalid JSON was received by the server.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A request was received before the `initialize` handshake completed.
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    /// Reserved catch-all error code.
    pub const UNKNOWN_ERROR_CODE: i64 = -32001;
    /// The request was cancelled by the client.
    pub const REQUEST_CANCELLED: i64 = -32800;
    /// The document was modified while the request was computed.
    pub const CONTENT_MODIFIED: i64 = -32801;
}
