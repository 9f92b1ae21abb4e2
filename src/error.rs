//! Error types for the waypost LSP client.
//!
//! This module defines all error types used throughout the crate,
//! organized by subsystem: wire framing, JSON-RPC, and the LSP layer.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::lsp::ConnectionState;

/// Errors raised while decoding a single frame off the wire.
///
/// Any of these observed by the dispatcher terminates the read loop and
/// closes the connection: once byte-level framing is out of sync there is
/// no safe way to find the start of the next frame.
#[derive(Debug, Error)]
pub enum FramingError {
    /// A header line was not terminated with `\r\n`.
    #[error("header line is missing its \\r\\n terminator")]
    UnterminatedHeader,

    /// A header other than `Content-Length` or `Content-Type` was sent.
    #[error("unrecognized header: {0:?}")]
    UnknownHeader(String),

    /// The `Content-Length` value did not parse as a non-negative integer.
    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    /// The header block ended without declaring a `Content-Length`.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The frame payload was not valid JSON.
    #[error("frame payload is not valid JSON: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// The stream failed mid-frame.
    #[error("IO error while reading frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the JSON-RPC endpoint.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The inbound byte stream violated the framing rules.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The connection closed while a call was outstanding, or before a
    /// message could be sent.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server answered a call with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Server {
        /// The error code reported by the server.
        code: i64,
        /// The human-readable message reported by the server.
        message: String,
        /// Optional structured data attached to the error.
        data: Option<Value>,
    },

    /// A message could not be serialized before sending.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The outbound stream failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the language-server connection and its operations.
#[derive(Debug, Error)]
pub enum LspError {
    /// The language server process failed to start.
    #[error("failed to start language server: {0}")]
    SpawnFailed(String),

    /// The `initialize` handshake failed.
    #[error("language server initialization failed: {0}")]
    InitializationFailed(String),

    /// A request was issued while the connection was not in the `Ready`
    /// state. Calls are not queued; issuing one early is a usage error.
    #[error("connection not ready for requests (state: {0})")]
    NotReady(ConnectionState),

    /// A request did not complete within the configured deadline.
    #[error("language server request timed out after {0:?}")]
    Timeout(Duration),

    /// A path could not be converted to a `file://` URI.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A document could not be read from disk.
    #[error("failed to read document: {0}")]
    DocumentRead(String),

    /// The server's response did not have the shape the operation expects.
    #[error("failed to parse language server response: {0}")]
    ParseError(String),

    /// The underlying JSON-RPC exchange failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// A unified error type for the entire crate.
#[derive(Debug, Error)]
pub enum Error {
    /// JSON-RPC endpoint error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// LSP connection or operation error.
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for waypost operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_error_display() {
        let err = FramingError::InvalidContentLength("12x".to_string());
        assert_eq!(err.to_string(), "invalid Content-Length value: \"12x\"");
    }

    #[test]
    fn test_server_error_display() {
        let err = RpcError::Server {
            code: -32601,
            message: "method not found".to_string(),
            data: None,
        };
        assert_eq!(err.to_string(), "server error -32601: method not found");
    }

    #[test]
    fn test_error_conversion() {
        let rpc_err = RpcError::ConnectionClosed;
        let err: Error = rpc_err.into();
        assert!(matches!(err, Error::Rpc(RpcError::ConnectionClosed)));
    }

    #[test]
    fn test_lsp_error_from_rpc_error() {
        let rpc_err = RpcError::ConnectionClosed;
        let lsp_err: LspError = rpc_err.into();
        assert!(matches!(lsp_err, LspError::Rpc(RpcError::ConnectionClosed)));
    }
}
