//! Errors and sniffing shared by the codecs.

use thiserror::Error;

/// Errors that can occur while decoding or encoding an OTLP payload
#[derive(Debug, Error)]
pub enum DecodeError {
    /// JSON (de)serialization failed
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
    /// Protobuf decoding failed
    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
    /// General parse error (e.g., UTF-8, JSONL line errors)
    #[error("parse error: {0}")]
    Parse(String),
    /// Neither format could decode the payload
    #[error("unsupported payload: {0}")]
    Unsupported(String),
}

/// First non-whitespace byte opens a JSON object or array.
pub fn looks_like_json(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'{' || *b == b'[')
        .unwrap_or(false)
}
