//! otlp-transform - Declarative transform statements over OTLP telemetry
//!
//! This crate binds small transformation statements (`set`, `delete_key`,
//! `convert_gauge_to_sum`, ...) to one kind of telemetry record and runs them
//! over OpenTelemetry Protocol (OTLP) requests, mutating records in place.
//!
//! # Design Principles
//!
//! - **Bind once**: paths, arguments and function names are checked when a
//!   [`Processor`] is built; only data-shape mismatches surface at run time
//! - **Per-record failures**: a failing statement never aborts a batch, it is
//!   counted in a [`BatchReport`]
//! - **No I/O, no async**: pure synchronous transforms over borrowed records
//! - **Context polymorphic**: spans, logs, data points and resources share
//!   one evaluator through the [`ContextKind`] trait
//!
//! # High-level API
//!
//! ```ignore
//! use otlp_transform::{transform_metrics, Config, InputFormat, Processor};
//!
//! let processor = Processor::new(Config::from_json(config_json)?)?;
//! let out = transform_metrics(&processor, bytes, InputFormat::Protobuf)?;
//! println!("{} of {} records failed", out.report.failed_records, out.report.records);
//! ```
//!
//! # Lower-level API
//!
//! ```ignore
//! use otlp_transform::contexts::{for_each_span, SpanKind};
//! use otlp_transform::transform::{Statements, SPAN_FUNCTIONS};
//!
//! let statements = Statements::<SpanKind>::bind(&SPAN_FUNCTIONS, &asts)?;
//! let mut index = 0;
//! for_each_span(&mut request, |mut ctx| {
//!     let errors = statements.execute(index, &mut ctx);
//!     index += 1;
//! });
//! ```

pub mod ast;
pub mod config;
pub mod contexts;
pub mod decode;
pub mod error;
pub mod processor;
pub mod transform;
pub mod value;

pub use ast::{ArgumentAst, CallAst, CompareOp, ConditionAst, Key, PathAst, StatementAst};
pub use config::{Config, ContextName, ContextStatements, ErrorMode};
pub use contexts::{
    ContextKind, DataPointContext, DataPointKind, LogContext, LogKind, ResourceContext,
    ResourceKind, SpanContext, SpanKind, TelemetryContext,
};
pub use decode::{
    decode_logs, decode_metrics, decode_traces, encode_logs, encode_metrics, encode_traces,
    DecodeError, InputFormat,
};
pub use error::{BindError, Error, ExecutionError, Result};
pub use processor::Processor;
pub use transform::{BatchReport, Function, Registry, RecordError, Statements};
pub use value::Value;

/// A transformed payload plus what went wrong along the way.
#[derive(Debug)]
pub struct Transformed {
    /// The request re-encoded in the format it arrived in
    pub payload: Vec<u8>,
    pub report: BatchReport,
}

/// Decode OTLP traces, run the processor's trace statements, re-encode.
///
/// `Auto` input is re-encoded as protobuf.
pub fn transform_traces(
    processor: &Processor,
    bytes: &[u8],
    format: InputFormat,
) -> Result<Transformed> {
    let mut request = decode_traces(bytes, format)?;
    let report = processor.process_traces(&mut request)?;
    let payload = encode_traces(&request, format)?;
    Ok(Transformed { payload, report })
}

/// Decode OTLP logs, run the processor's log statements, re-encode.
pub fn transform_logs(
    processor: &Processor,
    bytes: &[u8],
    format: InputFormat,
) -> Result<Transformed> {
    let mut request = decode_logs(bytes, format)?;
    let report = processor.process_logs(&mut request)?;
    let payload = encode_logs(&request, format)?;
    Ok(Transformed { payload, report })
}

/// Decode OTLP metrics, run the processor's metric statements, re-encode.
pub fn transform_metrics(
    processor: &Processor,
    bytes: &[u8],
    format: InputFormat,
) -> Result<Transformed> {
    let mut request = decode_metrics(bytes, format)?;
    let report = processor.process_metrics(&mut request)?;
    let payload = encode_metrics(&request, format)?;
    Ok(Transformed { payload, report })
}
