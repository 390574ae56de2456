//! Built-in functions and the registry that maps identifiers to them.
//!
//! Each function is a unit struct implementing [`Function`] for every context
//! kind it supports. `compile` receives arguments that have already been
//! checked against the declared [`Parameter`]s and returns a bound
//! [`ExprFunc`]; any extra validation (regex syntax, enum literals, limits)
//! happens there, so nothing about a statement is left to check at runtime
//! except the shape of the data itself.

mod core;
mod keys;
mod metrics;

use indexmap::IndexMap;

use crate::contexts::datapoint::MetricContext;
use crate::contexts::ContextKind;
use crate::error::BindError;

use super::getter::{ExprFunc, GetSetter, Getter, Setter, Target};

pub use self::core::{Concat, IsMatch, ParseJson, ReplacePattern, Set};
pub use keys::{DeleteKey, DeleteMatchingKeys, KeepKeys, Limit, TruncateAll};
pub use metrics::{ConvertGaugeToSum, ConvertSumToGauge};

/// A function factory.
pub trait Function<K: ContextKind>: Send + Sync {
    fn identifier(&self) -> &'static str;

    fn parameters(&self) -> &'static [Parameter];

    fn compile(&self, arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub keyword: &'static str,
    pub kind: ParameterKind,
    pub required: bool,
}

/// What an argument must look like to bind to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Literal, path, nested call or list.
    Getter,
    /// A list whose items are getters.
    GetterList,
    /// A writable path.
    GetSetter,
    /// Any value; written back only when it is a writable path.
    Target,
    /// A writable path.
    Setter,
    String,
    Int,
    Bool,
    /// A list of string literals.
    StringList,
}

impl ParameterKind {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            ParameterKind::Getter | ParameterKind::Target => "a value",
            ParameterKind::GetterList => "a list",
            ParameterKind::GetSetter | ParameterKind::Setter => "a path",
            ParameterKind::String => "a string literal",
            ParameterKind::Int => "an int literal",
            ParameterKind::Bool => "a bool literal",
            ParameterKind::StringList => "a list of string literals",
        }
    }
}

/// A bound argument.
pub enum Argument<K: ContextKind> {
    Getter(Box<dyn Getter<K>>),
    GetterList(Vec<Box<dyn Getter<K>>>),
    GetSetter(Box<dyn GetSetter<K>>),
    Target(Target<K>),
    Setter(Box<dyn Setter<K>>),
    String(String),
    Int(i64),
    Bool(bool),
    StringList(Vec<String>),
}

/// Bound arguments keyed by parameter keyword.
pub struct ArgumentList<K: ContextKind> {
    function: &'static str,
    arguments: IndexMap<&'static str, Argument<K>>,
}

impl<K: ContextKind> ArgumentList<K> {
    pub(crate) fn new(function: &'static str) -> Self {
        Self {
            function,
            arguments: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, keyword: &'static str, argument: Argument<K>) {
        self.arguments.insert(keyword, argument);
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    fn take(&mut self, keyword: &'static str) -> Option<Argument<K>> {
        self.arguments.shift_remove(keyword)
    }

    fn missing(&self, keyword: &str, expected: &str) -> BindError {
        BindError::invalid_argument(self.function, keyword, format!("expected {expected}"))
    }

    pub fn required_getter(&mut self, keyword: &'static str) -> Result<Box<dyn Getter<K>>, BindError> {
        match self.take(keyword) {
            Some(Argument::Getter(g)) => Ok(g),
            _ => Err(self.missing(keyword, "a value")),
        }
    }

    pub fn required_getter_list(
        &mut self,
        keyword: &'static str,
    ) -> Result<Vec<Box<dyn Getter<K>>>, BindError> {
        match self.take(keyword) {
            Some(Argument::GetterList(items)) => Ok(items),
            _ => Err(self.missing(keyword, "a list")),
        }
    }

    pub fn required_get_setter(
        &mut self,
        keyword: &'static str,
    ) -> Result<Box<dyn GetSetter<K>>, BindError> {
        match self.take(keyword) {
            Some(Argument::GetSetter(gs)) => Ok(gs),
            _ => Err(self.missing(keyword, "a path")),
        }
    }

    pub fn required_target(&mut self, keyword: &'static str) -> Result<Target<K>, BindError> {
        match self.take(keyword) {
            Some(Argument::Target(target)) => Ok(target),
            _ => Err(self.missing(keyword, "a value")),
        }
    }

    pub fn required_setter(&mut self, keyword: &'static str) -> Result<Box<dyn Setter<K>>, BindError> {
        match self.take(keyword) {
            Some(Argument::Setter(s)) => Ok(s),
            _ => Err(self.missing(keyword, "a path")),
        }
    }

    pub fn required_string(&mut self, keyword: &'static str) -> Result<String, BindError> {
        self.optional_string(keyword)?
            .ok_or_else(|| self.missing(keyword, "a string literal"))
    }

    pub fn optional_string(&mut self, keyword: &'static str) -> Result<Option<String>, BindError> {
        match self.take(keyword) {
            None => Ok(None),
            Some(Argument::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.missing(keyword, "a string literal")),
        }
    }

    pub fn required_int(&mut self, keyword: &'static str) -> Result<i64, BindError> {
        match self.take(keyword) {
            Some(Argument::Int(i)) => Ok(i),
            _ => Err(self.missing(keyword, "an int literal")),
        }
    }

    pub fn required_bool(&mut self, keyword: &'static str) -> Result<bool, BindError> {
        self.optional_bool(keyword)?
            .ok_or_else(|| self.missing(keyword, "a bool literal"))
    }

    pub fn optional_bool(&mut self, keyword: &'static str) -> Result<Option<bool>, BindError> {
        match self.take(keyword) {
            None => Ok(None),
            Some(Argument::Bool(b)) => Ok(Some(b)),
            Some(_) => Err(self.missing(keyword, "a bool literal")),
        }
    }

    pub fn required_string_list(&mut self, keyword: &'static str) -> Result<Vec<String>, BindError> {
        match self.take(keyword) {
            Some(Argument::StringList(items)) => Ok(items),
            _ => Err(self.missing(keyword, "a list of string literals")),
        }
    }
}

/// Function lookup table for one context kind. Read-only once built.
pub struct Registry<K: ContextKind> {
    functions: IndexMap<&'static str, Box<dyn Function<K>>>,
}

impl<K: ContextKind> Default for Registry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ContextKind> Registry<K> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            functions: IndexMap::new(),
        }
    }

    /// The functions available in every context.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for function in standard::<K>() {
            registry.functions.insert(function.identifier(), function);
        }
        registry
    }

    /// Adds `function`, replacing any function with the same identifier.
    pub fn register(&mut self, function: impl Function<K> + 'static) -> &mut Self {
        self.functions
            .insert(function.identifier(), Box::new(function));
        self
    }

    pub fn get(&self, identifier: &str) -> Option<&dyn Function<K>> {
        self.functions.get(identifier).map(|f| f.as_ref())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.functions.contains_key(identifier)
    }

    /// Registered identifiers in registration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

impl<K: MetricContext> Registry<K> {
    /// The standard functions plus the metric reshaping functions.
    pub fn with_metrics() -> Self {
        let mut registry = Self::standard();
        for function in metrics::<K>() {
            registry.functions.insert(function.identifier(), function);
        }
        registry
    }
}

/// Get all functions that work in any context
pub fn standard<K: ContextKind>() -> Vec<Box<dyn Function<K>>> {
    vec![
        // Key manipulation
        Box::new(DeleteKey),
        Box::new(DeleteMatchingKeys),
        Box::new(KeepKeys),
        Box::new(Limit),
        Box::new(TruncateAll),
        // Values
        Box::new(Set),
        Box::new(ReplacePattern),
        Box::new(Concat),
        Box::new(IsMatch),
        Box::new(ParseJson),
    ]
}

/// Get the functions that need access to the parent metric
pub fn metrics<K: MetricContext>() -> Vec<Box<dyn Function<K>>> {
    vec![Box::new(ConvertGaugeToSum), Box::new(ConvertSumToGauge)]
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for exercising functions against a single log record.

    use opentelemetry_proto::tonic::logs::v1::LogRecord;

    use crate::ast::StatementAst;
    use crate::contexts::{LogContext, LogKind};
    use crate::error::{BindError, ExecutionError};
    use crate::transform::{Outcome, Statement};
    use crate::value::Value;

    use super::Registry;

    pub fn bind(statement: StatementAst) -> Result<Statement<LogKind>, BindError> {
        Registry::<LogKind>::standard().bind_statement(&statement)
    }

    /// Binds and runs one statement, returning what the function produced.
    pub fn run(
        record: &mut LogRecord,
        statement: StatementAst,
    ) -> Result<Option<Value>, ExecutionError> {
        let statement = bind(statement).expect("statement binds");
        let mut scope = None;
        let mut resource = None;
        let mut ctx = LogContext::new(record, &mut scope, &mut resource);
        match statement.execute(&mut ctx)? {
            Outcome::Applied(value) => Ok(value),
            Outcome::ConditionNotMet => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::{DataPointKind, SpanKind};

    #[test]
    fn test_standard_registry_is_shared_by_all_contexts() {
        let span = Registry::<SpanKind>::standard();
        let points = Registry::<DataPointKind>::with_metrics();

        for id in span.identifiers() {
            assert!(points.contains(id), "{id} missing from datapoint registry");
        }
        assert!(!span.contains("convert_gauge_to_sum"));
        assert!(points.contains("convert_gauge_to_sum"));
        assert!(points.contains("convert_sum_to_gauge"));
    }

    #[test]
    fn test_register_replaces_by_identifier() {
        let mut registry = Registry::<SpanKind>::new();
        registry.register(DeleteKey).register(DeleteKey);
        assert_eq!(registry.identifiers().collect::<Vec<_>>(), vec!["delete_key"]);
        assert!(registry.get("delete_key").is_some());
        assert!(registry.get("nope").is_none());
    }
}
