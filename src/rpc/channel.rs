//! Full-duplex JSON-RPC message channel over a pair of byte streams.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::error::RpcError;
use crate::rpc::transport::{self, Envelope};

/// Boxed input half of a connection.
pub type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Boxed output half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Owns one input and one output stream and moves whole JSON values
/// across them.
///
/// Both the calling task (client-initiated requests and notifications) and
/// the dispatcher loop (responses to server-initiated requests) write
/// concurrently; the write lock guarantees a frame from one writer is never
/// interleaved with another's. The read lock documents the single-reader
/// invariant: the dispatcher loop is the only caller of [`recv`].
///
/// [`recv`]: RpcChannel::recv
pub struct RpcChannel {
    reader: Mutex<BoxedReader>,
    writer: Mutex<BoxedWriter>,
}

impl RpcChannel {
    /// Creates a channel over the given stream halves.
    pub fn new(
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Mutex::new(Box::new(reader)),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Encodes one message and writes it as a single atomic frame.
    pub async fn send(&self, message: &Value) -> Result<(), RpcError> {
        let mut writer = self.writer.lock().await;
        transport::write_message(&mut *writer, message).await
    }

    /// Receives and classifies the next message.
    ///
    /// Returns `Ok(None)` when the peer cleanly closed the stream.
    pub async fn recv(&self) -> Result<Option<Envelope>, RpcError> {
        let mut reader = self.reader.lock().await;
        let message = transport::read_message(&mut *reader).await?;
        Ok(message.map(Envelope::classify))
    }
}
