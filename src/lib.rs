//! waypost: an LSP client core for semantic code navigation.
//!
//! This crate speaks the client side of the Language Server Protocol's
//! JSON-RPC transport: it frames messages over a byte stream, correlates
//! asynchronous requests with their responses, dispatches server-initiated
//! requests and notifications to registered handlers, and supervises the
//! lifecycle of the language-server subprocess.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐        ┌────────────────┐   stdio    ┌───────────────┐
//! │   editor / │───────▶│   LspClient    │◀──────────▶│   Language    │
//! │   caller   │◀───────│  (this crate)  │ (JSON-RPC) │   Server      │
//! └────────────┘        └───────┬────────┘            │ (ccls, clangd,│
//!                               │                     │ rust-analyzer)│
//!                        ┌──────▼──────┐              └───────────────┘
//!                        │ rpc::Endpoint│
//!                        │  (dispatcher)│
//!                        └─────────────┘
//! ```
//!
//! A background task per connection runs the dispatcher read loop and is
//! the exclusive reader of the server's output stream. Any number of
//! caller tasks issue requests concurrently; responses are correlated by
//! id, so they may arrive out of order.
//!
//! # Modules
//!
//! - [`rpc`] - JSON-RPC framing, channel, correlation and dispatch
//! - [`lsp`] - connection lifecycle, handshake and navigation operations
//! - [`config`] - the configuration consumed by a connection
//! - [`error`] - error types for the entire crate
//!
//! # Example
//!
//! ```no_run
//! use waypost::lsp::client::LspClient;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = LspClient::builder()
//!         .server_command("ccls")
//!         .workspace_root("/home/user/qsound")
//!         .build()
//!         .await?;
//!
//!     let file = Path::new("/home/user/qsound/sound.cpp");
//!     client.did_open(file).await?;
//!     let definitions = client.goto_definition(file, 26, 25).await?;
//!     println!("{definitions:?}");
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

// Enforce documentation and other quality attributes
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are too strict
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod lsp;
pub mod rpc;

// Re-export commonly used types at the crate root
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use lsp::{ConnectionState, LspClient, SourceLocation};
