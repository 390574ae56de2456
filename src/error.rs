//! Error types for binding, evaluation and payload handling.
//!
//! Binding failures ([`BindError`]) only ever surface while statements are
//! being bound, i.e. when a [`crate::Processor`] is constructed. Evaluation
//! failures ([`ExecutionError`]) are scoped to one statement on one record and
//! never abort a batch.

use std::fmt;

use thiserror::Error;

use crate::decode::DecodeError;
use crate::transform::BatchReport;

/// Crate-level result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by the processor and the byte-oriented API.
#[derive(Debug, Error)]
pub enum Error {
    /// A statement or argument could not be bound.
    #[error("failed to bind statements: {0}")]
    Bind(#[from] BindError),
    /// The configuration is structurally invalid.
    #[error("invalid config: {0}")]
    Config(String),
    /// A payload could not be decoded or encoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// At least one record failed a statement and the error mode is `propagate`.
    #[error(
        "{} of {} records failed at least one statement",
        .0.failed_records,
        .0.records
    )]
    PartialFailure(BatchReport),
    /// The processor no longer accepts batches.
    #[error("processor is shut down")]
    Shutdown,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Errors raised while binding statement ASTs against a context kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("unknown function \"{0}\"")]
    UnknownFunction(String),

    #[error("function \"{function}\" expects {expected} arguments, got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("invalid argument \"{keyword}\" for \"{function}\": {reason}")]
    InvalidArgument {
        function: String,
        keyword: String,
        reason: String,
    },

    #[error("unknown path \"{path}\" in {context} context")]
    UnknownPath { context: &'static str, path: String },

    #[error("invalid key on path \"{path}\": {reason}")]
    InvalidKey { path: String, reason: String },

    #[error("path \"{path}\" is read-only in {context} context")]
    ReadOnly { context: &'static str, path: String },

    /// Wraps any of the above with the statement it came from.
    #[error("{context} statement {index} `{statement}`: {source}")]
    Statement {
        context: &'static str,
        index: usize,
        statement: String,
        #[source]
        source: Box<BindError>,
    },
}

impl BindError {
    pub(crate) fn invalid_argument(
        function: &str,
        keyword: &str,
        reason: impl Into<String>,
    ) -> Self {
        BindError::InvalidArgument {
            function: function.to_string(),
            keyword: keyword.to_string(),
            reason: reason.into(),
        }
    }

    /// Strips statement wrappers and returns the underlying error.
    pub fn root(&self) -> &BindError {
        match self {
            BindError::Statement { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors raised while evaluating a bound statement against one record.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The path (or a key along it) does not exist in this record.
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    /// A value could not be read or written as the required type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A function failed with its own error.
    #[error("function \"{function}\" failed: {source}")]
    Function {
        function: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ExecutionError {
    pub(crate) fn mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        ExecutionError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        ExecutionError::PathNotFound { path: path.into() }
    }

    /// Prefixes a `PathNotFound` location with the full path text.
    pub(crate) fn at_path(self, path: &str) -> Self {
        match self {
            ExecutionError::PathNotFound { path: key } => ExecutionError::PathNotFound {
                path: format!("{path} ({key})"),
            },
            other => other,
        }
    }

    pub fn is_path_not_found(&self) -> bool {
        matches!(self, ExecutionError::PathNotFound { .. })
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, ExecutionError::TypeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_root_unwraps_statement() {
        let inner = BindError::UnknownFunction("nope".into());
        let err = BindError::Statement {
            context: "span",
            index: 2,
            statement: "nope()".into(),
            source: Box::new(inner.clone()),
        };
        assert_eq!(err.root(), &inner);
        assert_eq!(
            err.to_string(),
            "span statement 2 `nope()`: unknown function \"nope\""
        );
    }

    #[test]
    fn test_at_path_only_rewrites_not_found() {
        let err = ExecutionError::not_found("[3]").at_path("attributes[\"a\"]");
        assert_eq!(err.to_string(), "path not found: attributes[\"a\"] ([3])");

        let err = ExecutionError::mismatch("int", "string").at_path("name");
        assert!(err.is_type_mismatch());
    }
}
