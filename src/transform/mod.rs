//! Statement binding and evaluation.
//!
//! This module turns statement ASTs into bound [`Statements`] for one context
//! kind and runs them over records. Everything here is generic over
//! [`ContextKind`](crate::contexts::ContextKind); the default registries for
//! the built-in kinds are built once, on first use.

mod bind;
pub mod condition;
pub mod functions;
pub mod getter;
pub mod path;
pub mod statement;

use once_cell::sync::Lazy;

use crate::contexts::{DataPointKind, LogKind, ResourceKind, SpanKind};

pub use condition::Condition;
pub use functions::{Argument, ArgumentList, Function, Parameter, ParameterKind, Registry};
pub use getter::{ExprFunc, GetSetter, Getter, Literal, Setter};
pub use path::{resolve_path, PathAccessor};
pub use statement::{BatchReport, Outcome, RecordError, Statement, Statements};

pub static SPAN_FUNCTIONS: Lazy<Registry<SpanKind>> = Lazy::new(Registry::standard);

pub static LOG_FUNCTIONS: Lazy<Registry<LogKind>> = Lazy::new(Registry::standard);

pub static RESOURCE_FUNCTIONS: Lazy<Registry<ResourceKind>> = Lazy::new(Registry::standard);

pub static DATAPOINT_FUNCTIONS: Lazy<Registry<DataPointKind>> =
    Lazy::new(Registry::with_metrics);
