//! OTLP codec layer - raw bytes to export requests and back
//!
//! Payloads are decoded into the generated `Export*ServiceRequest` messages so
//! statements can mutate them in place, then encoded again in the format they
//! arrived in.
//!
//! # Usage
//!
//! ```ignore
//! use otlp_transform::decode::{decode_logs, encode_logs, InputFormat};
//!
//! let mut request = decode_logs(bytes, InputFormat::Protobuf)?;
//! let out = encode_logs(&request, InputFormat::Protobuf)?;
//! ```
//!
//! Gzip decompression is the caller's responsibility.

mod common;
mod normalize;

pub use common::{looks_like_json, DecodeError};
pub use normalize::{normalize_json_bytes, normalize_json_value};

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Input format for OTLP decoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    /// Protocol Buffers binary format
    Protobuf,
    /// JSON format
    Json,
    /// Newline-delimited JSON (JSONL/NDJSON), one export request per line
    Jsonl,
    /// Auto-detect JSON vs protobuf, with fallback decoding
    Auto,
}

impl InputFormat {
    /// Infer input format from Content-Type header.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let content_type = content_type.map(|v| v.trim().to_ascii_lowercase());

        match content_type.as_deref() {
            Some("application/x-ndjson") | Some("application/jsonl") => InputFormat::Jsonl,
            Some("application/json") | Some("application/otlp+json") => InputFormat::Json,
            Some("application/x-protobuf")
            | Some("application/protobuf")
            | Some("application/otlp") => InputFormat::Protobuf,
            _ => InputFormat::Auto,
        }
    }

    /// Returns the canonical Content-Type string for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            InputFormat::Protobuf => "application/x-protobuf",
            InputFormat::Json => "application/json",
            InputFormat::Jsonl => "application/x-ndjson",
            InputFormat::Auto => "application/x-protobuf", // Default to protobuf
        }
    }
}

/// An export request that can travel as protobuf or OTLP JSON.
pub trait OtlpRequest: Message + Default + Serialize + DeserializeOwned {
    /// Appends another request's resource groups, used to merge JSONL lines.
    fn append(&mut self, other: Self);
}

impl OtlpRequest for ExportTraceServiceRequest {
    fn append(&mut self, other: Self) {
        self.resource_spans.extend(other.resource_spans);
    }
}

impl OtlpRequest for ExportLogsServiceRequest {
    fn append(&mut self, other: Self) {
        self.resource_logs.extend(other.resource_logs);
    }
}

impl OtlpRequest for ExportMetricsServiceRequest {
    fn append(&mut self, other: Self) {
        self.resource_metrics.extend(other.resource_metrics);
    }
}

pub fn decode_traces(
    bytes: &[u8],
    format: InputFormat,
) -> Result<ExportTraceServiceRequest, DecodeError> {
    decode(bytes, format)
}

pub fn decode_logs(
    bytes: &[u8],
    format: InputFormat,
) -> Result<ExportLogsServiceRequest, DecodeError> {
    decode(bytes, format)
}

pub fn decode_metrics(
    bytes: &[u8],
    format: InputFormat,
) -> Result<ExportMetricsServiceRequest, DecodeError> {
    decode(bytes, format)
}

pub fn encode_traces(
    request: &ExportTraceServiceRequest,
    format: InputFormat,
) -> Result<Vec<u8>, DecodeError> {
    encode(request, format)
}

pub fn encode_logs(
    request: &ExportLogsServiceRequest,
    format: InputFormat,
) -> Result<Vec<u8>, DecodeError> {
    encode(request, format)
}

pub fn encode_metrics(
    request: &ExportMetricsServiceRequest,
    format: InputFormat,
) -> Result<Vec<u8>, DecodeError> {
    encode(request, format)
}

/// Decodes any export request. `Auto` sniffs the first byte and falls back to
/// the other format before giving up.
pub fn decode<R: OtlpRequest>(bytes: &[u8], format: InputFormat) -> Result<R, DecodeError> {
    match format {
        InputFormat::Protobuf => decode_protobuf(bytes),
        InputFormat::Json => decode_json(bytes),
        InputFormat::Jsonl => decode_jsonl(bytes),
        InputFormat::Auto => {
            if looks_like_json(bytes) {
                match decode_json(bytes) {
                    Ok(request) => Ok(request),
                    Err(json_err) => {
                        // Several concatenated documents are valid JSONL
                        match decode_jsonl(bytes) {
                            Ok(request) => Ok(request),
                            Err(_jsonl_err) => decode_protobuf(bytes).map_err(|proto_err| {
                                DecodeError::Unsupported(format!(
                                    "json decode failed: {json_err}; protobuf fallback failed: {proto_err}"
                                ))
                            }),
                        }
                    }
                }
            } else {
                match decode_protobuf(bytes) {
                    Ok(request) => Ok(request),
                    Err(proto_err) => decode_json(bytes).map_err(|json_err| {
                        DecodeError::Unsupported(format!(
                            "protobuf decode failed: {proto_err}; json fallback failed: {json_err}"
                        ))
                    }),
                }
            }
        }
    }
}

/// Encodes a request. `Jsonl` output is a single JSON line; `Auto` encodes
/// protobuf.
pub fn encode<R: OtlpRequest>(request: &R, format: InputFormat) -> Result<Vec<u8>, DecodeError> {
    match format {
        InputFormat::Json => Ok(serde_json::to_vec(request)?),
        InputFormat::Jsonl => {
            let mut out = serde_json::to_vec(request)?;
            out.push(b'\n');
            Ok(out)
        }
        InputFormat::Protobuf | InputFormat::Auto => Ok(request.encode_to_vec()),
    }
}

fn decode_protobuf<R: OtlpRequest>(bytes: &[u8]) -> Result<R, DecodeError> {
    Ok(R::decode(bytes)?)
}

fn decode_json<R: OtlpRequest>(bytes: &[u8]) -> Result<R, DecodeError> {
    let normalized = normalize_json_bytes(bytes)?;
    Ok(serde_json::from_value(normalized)?)
}

fn decode_jsonl<R: OtlpRequest>(bytes: &[u8]) -> Result<R, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::Parse(format!("invalid UTF-8 in JSONL payload: {e}")))?;

    let mut merged: Option<R> = None;
    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request: R = decode_json(line.as_bytes())
            .map_err(|e| DecodeError::Parse(format!("jsonl line {}: {e}", line_num + 1)))?;
        match merged.as_mut() {
            Some(acc) => acc.append(request),
            None => merged = Some(request),
        }
    }

    merged.ok_or_else(|| DecodeError::Parse("JSONL payload contains no records".into()))
}
