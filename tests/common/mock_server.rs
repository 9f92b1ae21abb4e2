//! A scripted language server speaking real frames over an in-memory pipe.
//!
//! Tests attach the client side of a [`tokio::io::duplex`] pair to an
//! endpoint or `LspClient`, then drive this half from a spawned task:
//! expect the requests the client should send, answer them (in any order),
//! and misbehave on purpose where a test needs a non-conforming server.

use serde_json::{Value, json};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

use waypost::rpc::transport;

/// Client-side stream halves, ready for `Endpoint::new` or
/// `LspClientBuilder::attach`.
pub type ClientHalves = (BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>);

/// The server side of an in-memory connection.
pub struct MockServer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl MockServer {
    /// Creates a connected pair: the mock server and the client halves.
    pub fn pair() -> (Self, ClientHalves) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (server_read, server_write) = tokio::io::split(server_side);

        (
            Self {
                reader: BufReader::new(server_read),
                writer: server_write,
            },
            (BufReader::new(client_read), client_write),
        )
    }

    /// Receives the next decoded message from the client.
    pub async fn recv(&mut self) -> Value {
        transport::read_message(&mut self.reader)
            .await
            .expect("mock server failed to read a frame")
            .expect("client closed the stream")
    }

    /// Receives the next message and asserts it is a request for `method`.
    /// Returns its id and params.
    pub async fn expect_request(&mut self, method: &str) -> (Value, Value) {
        let message = self.recv().await;
        assert_eq!(message["method"], method, "unexpected message: {message}");
        let id = message.get("id").cloned().expect("request is missing an id");
        (id, message.get("params").cloned().unwrap_or(Value::Null))
    }

    /// Receives the next message and asserts it is a notification for
    /// `method`. Returns its params.
    pub async fn expect_notification(&mut self, method: &str) -> Value {
        let message = self.recv().await;
        assert_eq!(message["method"], method, "unexpected message: {message}");
        assert!(
            message.get("id").is_none(),
            "notification carries an id: {message}"
        );
        message.get("params").cloned().unwrap_or(Value::Null)
    }

    /// Sends a complete message as one frame.
    pub async fn send(&mut self, message: Value) {
        transport::write_message(&mut self.writer, &message)
            .await
            .expect("mock server failed to write a frame");
    }

    /// Sends raw bytes, bypassing the frame encoder.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer
            .write_all(bytes)
            .await
            .expect("mock server failed to write raw bytes");
        self.writer.flush().await.expect("mock server flush failed");
    }

    /// Sends a successful response for `id`.
    pub async fn respond(&mut self, id: Value, result: Value) {
        self.send(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
            .await;
    }

    /// Sends an error response for `id`.
    pub async fn respond_error(&mut self, id: Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }))
        .await;
    }

    /// Serves the `initialize`/`initialized` handshake, asserting its
    /// ordering: the result goes out before `initialized` is accepted.
    pub async fn handshake(&mut self) {
        let (id, params) = self.expect_request("initialize").await;
        assert!(
            params["rootUri"]
                .as_str()
                .is_some_and(|uri| uri.starts_with("file://")),
            "initialize params carry no rootUri: {params}"
        );
        assert!(params["capabilities"].is_object());

        self.respond(id, json!({ "capabilities": {} })).await;
        self.expect_notification("initialized").await;
    }

    /// Serves a graceful shutdown exchange, then drops the connection.
    pub async fn serve_shutdown(mut self) {
        let (id, _) = self.expect_request("shutdown").await;
        self.respond(id, Value::Null).await;
        self.expect_notification("exit").await;
    }
}
