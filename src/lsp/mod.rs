//! LSP (Language Server Protocol) client layer.
//!
//! This module owns the language-server side of the crate:
//! - `connection`: subprocess lifecycle, the connection state machine and
//!   the `initialize`/`initialized` handshake
//! - `client`: typed navigation operations (definition, references, hover,
//!   completion) over a connection
//! - `types`: path/URI conversion and normalized source locations

pub mod client;
pub mod connection;
pub mod types;

use crate::error::LspError;

/// Result type for LSP operations.
pub type LspResult<T> = std::result::Result<T, LspError>;

pub use client::{LspClient, LspClientBuilder};
pub use connection::{Connection, ConnectionState};
pub use types::SourceLocation;

// Re-export the lsp-types shapes that appear in this crate's public API
pub use lsp_types::{CompletionResponse, Hover, Location, Position, Url};
