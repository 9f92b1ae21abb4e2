//! Wire-framing codec for LSP's JSON-RPC transport.
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! Content-Length: <decimal-byte-length>\r\n
//! \r\n
//! <UTF-8 JSON payload, exactly decimal-byte-length bytes>
//! ```
//!
//! An optional `Content-Type: ...` header before the blank line is accepted
//! and ignored; any other header is rejected. The declared length counts
//! bytes, not characters, so multi-byte UTF-8 payloads must be measured
//! after serialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{FramingError, RpcError};
use crate::rpc::codes;

const LENGTH_HEADER: &str = "Content-Length: ";
const TYPE_HEADER: &str = "Content-Type: ";

/// A JSON-RPC error object, carried in the `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Protocol error code (see [`crate::rpc::codes`]).
    pub code: i64,
    /// Human-readable description of the error.
    pub message: String,
    /// Optional structured data attached to the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates an error object with no attached data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The error sent back when an inbound request names an unregistered
    /// method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )
    }

    /// Decodes the `error` member of a response.
    ///
    /// A malformed error object from a non-conforming server is folded into
    /// the reserved catch-all code rather than rejected, so the caller still
    /// sees the failure.
    fn from_value(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| Self {
            code: codes::UNKNOWN_ERROR_CODE,
            message: format!("malformed error object: {value}"),
            data: None,
        })
    }
}

/// A decoded JSON-RPC message.
///
/// The protocol has no explicit discriminator; the variant is inferred once,
/// at decode time, from field presence: `method` plus `id` is an inbound
/// request, `method` without `id` a notification, and no `method` a
/// response. Inbound request ids are kept as opaque JSON values and echoed
/// back verbatim in the matching response.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A server-initiated request that expects a response.
    Request {
        /// Request id, echoed back in the response.
        id: Value,
        /// Method name.
        method: String,
        /// Method parameters, if any.
        params: Option<Value>,
    },
    /// A server-initiated notification; no response exists for these.
    Notification {
        /// Method name.
        method: String,
        /// Method parameters, if any.
        params: Option<Value>,
    },
    /// A response to one of our outstanding calls.
    Response {
        /// Id of the call being answered; absent on non-conforming servers.
        id: Option<Value>,
        /// Result payload on success.
        result: Option<Value>,
        /// Error object on failure.
        error: Option<ErrorObject>,
    },
}

impl Envelope {
    /// Classifies a decoded JSON value into an envelope.
    ///
    /// Values that are not JSON objects, or objects whose `method` member is
    /// not a string, classify as a response with no id; the dispatcher logs
    /// and drops those rather than treating them as fatal.
    pub fn classify(message: Value) -> Self {
        let Value::Object(mut fields) = message else {
            return Self::Response {
                id: None,
                result: None,
                error: None,
            };
        };

        match fields.remove("method") {
            Some(Value::String(method)) => {
                let params = fields.remove("params");
                match fields.remove("id") {
                    Some(id) => Self::Request { id, method, params },
                    None => Self::Notification { method, params },
                }
            }
            _ => Self::Response {
                id: fields.remove("id"),
                result: fields.remove("result"),
                error: fields.remove("error").map(ErrorObject::from_value),
            },
        }
    }
}

/// Encodes one message and writes it as a single frame.
pub async fn write_message<W>(writer: &mut W, message: &Value) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message).map_err(RpcError::Encode)?;
    trace!(bytes = payload.len(), "writing frame");

    let header = format!("{LENGTH_HEADER}{}\r\n\r\n", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Reads one frame and decodes its payload.
///
/// Returns `Ok(None)` when the stream is cleanly closed where a header line
/// was expected; this distinguishes "peer closed" from "peer sent garbage",
/// which is a [`FramingError`].
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let Some(header) = line.strip_suffix("\r\n") else {
            return Err(FramingError::UnterminatedHeader);
        };

        if header.is_empty() {
            break;
        }

        if let Some(length) = header.strip_prefix(LENGTH_HEADER) {
            content_length = Some(
                length
                    .parse()
                    .map_err(|_| FramingError::InvalidContentLength(length.to_string()))?,
            );
        } else if header.strip_prefix(TYPE_HEADER).is_none() {
            return Err(FramingError::UnknownHeader(header.to_string()));
        }
    }

    let content_length = content_length.ok_or(FramingError::MissingContentLength)?;

    let mut payload = vec![0u8; content_length];
    reader.read_exact(&mut payload).await?;
    trace!(bytes = content_length, "read frame");

    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(FramingError::InvalidPayload)
}
