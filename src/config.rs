//! Processor configuration.
//!
//! Statements are grouped per signal and, within a signal, per context. A
//! config is usually read from JSON:
//!
//! ```json
//! {
//!   "error_mode": "propagate",
//!   "metric_statements": [
//!     {"context": "datapoint", "statements": [
//!       {"function": "convert_gauge_to_sum", "arguments": [{"string": "cumulative"}, {"bool": true}]}
//!     ]}
//!   ]
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::StatementAst;
use crate::error::{Error, Result};

/// What a batch call does when some records failed a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Log failures at `warn` and return the report.
    #[default]
    Ignore,
    /// Turn any failed record into `Error::PartialFailure`.
    Propagate,
    /// Only count failures.
    Silent,
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorMode::Ignore => "ignore",
            ErrorMode::Propagate => "propagate",
            ErrorMode::Silent => "silent",
        })
    }
}

/// The record kind a statement group is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextName {
    Resource,
    Span,
    Log,
    Datapoint,
}

impl fmt::Display for ContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContextName::Resource => "resource",
            ContextName::Span => "span",
            ContextName::Log => "log",
            ContextName::Datapoint => "datapoint",
        })
    }
}

/// Statements bound to one context, run in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextStatements {
    pub context: ContextName,
    #[serde(default)]
    pub statements: Vec<StatementAst>,
}

impl ContextStatements {
    pub fn new(context: ContextName, statements: Vec<StatementAst>) -> Self {
        Self {
            context,
            statements,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub error_mode: ErrorMode,
    #[serde(default)]
    pub trace_statements: Vec<ContextStatements>,
    #[serde(default)]
    pub log_statements: Vec<ContextStatements>,
    #[serde(default)]
    pub metric_statements: Vec<ContextStatements>,
}

impl Config {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_error_mode(mut self, error_mode: ErrorMode) -> Self {
        self.error_mode = error_mode;
        self
    }

    /// Checks that each group names a context its signal can run.
    ///
    /// Statements themselves are checked when the processor binds them.
    pub fn validate(&self) -> Result<()> {
        check_contexts(
            "trace",
            &self.trace_statements,
            &[ContextName::Resource, ContextName::Span],
        )?;
        check_contexts(
            "log",
            &self.log_statements,
            &[ContextName::Resource, ContextName::Log],
        )?;
        check_contexts(
            "metric",
            &self.metric_statements,
            &[ContextName::Resource, ContextName::Datapoint],
        )
    }
}

fn check_contexts(
    signal: &str,
    groups: &[ContextStatements],
    allowed: &[ContextName],
) -> Result<()> {
    match groups.iter().find(|g| !allowed.contains(&g.context)) {
        Some(group) => Err(Error::Config(format!(
            "context \"{}\" is not valid for {signal} statements",
            group.context
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.error_mode, ErrorMode::Ignore);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_json(
            r#"{
                "error_mode": "silent",
                "log_statements": [
                    {"context": "log", "statements": [
                        {"function": "delete_key", "arguments": [
                            {"path": {"fields": ["attributes"]}},
                            {"string": "password"}
                        ]}
                    ]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.error_mode, ErrorMode::Silent);
        assert_eq!(config.log_statements.len(), 1);
        assert_eq!(config.log_statements[0].context, ContextName::Log);
        assert_eq!(config.log_statements[0].statements[0].function, "delete_key");
    }

    #[test]
    fn test_context_must_match_signal() {
        let err = Config::from_json(r#"{"trace_statements": [{"context": "datapoint"}]}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config: context \"datapoint\" is not valid for trace statements"
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = Config::from_json(r#"{"error_mode": "ignore", "extra": 1}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_json(r#"{"error_mode": "loud"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
