//! Bound statements and per-batch evaluation.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::StatementAst;
use crate::contexts::{ContextKind, ResourceKind};
use crate::error::{BindError, ExecutionError};
use crate::value::Value;

use super::condition::Condition;
use super::functions::Registry;
use super::getter::ExprFunc;

/// What happened when a statement ran against one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The guard evaluated to false; the function was not invoked.
    ConditionNotMet,
    /// The function ran and produced this value, if any.
    Applied(Option<Value>),
}

/// One bound function plus its optional guard.
#[derive(Debug)]
pub struct Statement<K: ContextKind> {
    func: Box<dyn ExprFunc<K>>,
    condition: Option<Condition<K>>,
    text: String,
}

impl<K: ContextKind> Statement<K> {
    pub(crate) fn new(
        func: Box<dyn ExprFunc<K>>,
        condition: Option<Condition<K>>,
        text: String,
    ) -> Self {
        Self {
            func,
            condition,
            text,
        }
    }

    /// The statement as written, for logs and reports.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn execute(&self, ctx: &mut K::Ctx<'_>) -> Result<Outcome, ExecutionError> {
        if let Some(condition) = &self.condition {
            if !condition.evaluate(ctx)? {
                return Ok(Outcome::ConditionNotMet);
            }
        }
        self.func.invoke(ctx).map(Outcome::Applied)
    }
}

/// A statement failing on one record.
#[derive(Debug)]
pub struct RecordError {
    /// Context kind the statement was bound to.
    pub context: &'static str,
    /// Position of the record within the batch, in visiting order.
    pub record: usize,
    /// Position of the statement within its group.
    pub statement: usize,
    pub error: ExecutionError,
}

/// Partial-failure report for one batch.
///
/// `records` and `failed_records` count the signal's own records (spans, log
/// records or data points) once each, however many statement groups ran over
/// them. Resources reached through resource groups are counted apart.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: usize,
    pub failed_records: usize,
    pub resources: usize,
    pub failed_resources: usize,
    pub errors: Vec<RecordError>,
}

impl BatchReport {
    /// Builds a report from every failure collected over one batch.
    ///
    /// Errors are grouped by the record they hit, so a record failing in two
    /// groups counts once. Errors from the resource context count against
    /// resources.
    pub fn from_errors(records: usize, resources: usize, errors: Vec<RecordError>) -> Self {
        let mut failed = HashSet::new();
        let mut failed_resources = HashSet::new();
        for error in &errors {
            if error.context == ResourceKind::NAME {
                failed_resources.insert(error.record);
            } else {
                failed.insert(error.record);
            }
        }
        Self {
            records,
            failed_records: failed.len(),
            resources,
            failed_resources: failed_resources.len(),
            errors,
        }
    }

    /// Accounts for one evaluated record and its failures.
    pub fn record(&mut self, errors: Vec<RecordError>) {
        self.records += 1;
        if !errors.is_empty() {
            self.failed_records += 1;
            self.errors.extend(errors);
        }
    }

    pub fn is_partial_failure(&self) -> bool {
        self.failed_records > 0 || self.failed_resources > 0
    }
}

/// An ordered group of statements bound to one context kind.
#[derive(Debug)]
pub struct Statements<K: ContextKind> {
    statements: Vec<Statement<K>>,
}

impl<K: ContextKind> Statements<K> {
    /// Binds every statement, failing on the first one that does not bind.
    pub fn bind(registry: &Registry<K>, asts: &[StatementAst]) -> Result<Self, BindError> {
        let statements = asts
            .iter()
            .enumerate()
            .map(|(index, ast)| {
                registry
                    .bind_statement(ast)
                    .map_err(|e| BindError::Statement {
                        context: K::NAME,
                        index,
                        statement: ast.to_string(),
                        source: Box::new(e),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { statements })
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement<K>> {
        self.statements.iter()
    }

    /// Runs every statement against one record in declared order. A failing
    /// statement never stops the ones after it.
    pub fn execute(&self, record: usize, ctx: &mut K::Ctx<'_>) -> Vec<RecordError> {
        let mut errors = Vec::new();
        for (index, statement) in self.statements.iter().enumerate() {
            if let Err(error) = statement.execute(ctx) {
                debug!(
                    context = K::NAME,
                    record,
                    statement = statement.text(),
                    error = %error,
                    "statement failed"
                );
                errors.push(RecordError {
                    context: K::NAME,
                    record,
                    statement: index,
                    error,
                });
            }
        }
        errors
    }

    /// Runs the group over every context the iterator yields.
    pub fn execute_batch<'a, I>(&self, contexts: I) -> BatchReport
    where
        I: IntoIterator<Item = K::Ctx<'a>>,
    {
        let mut report = BatchReport::default();
        for (record, mut ctx) in contexts.into_iter().enumerate() {
            report.record(self.execute(record, &mut ctx));
        }
        report
    }
}
