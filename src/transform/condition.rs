//! Bound guard conditions.

use std::cmp::Ordering;

use crate::ast::CompareOp;
use crate::contexts::ContextKind;
use crate::error::ExecutionError;
use crate::value::Value;

use super::getter::Getter;

#[derive(Debug)]
pub enum Condition<K: ContextKind> {
    Compare {
        left: Box<dyn Getter<K>>,
        op: CompareOp,
        right: Box<dyn Getter<K>>,
    },
    And(Vec<Condition<K>>),
    Or(Vec<Condition<K>>),
    Not(Box<Condition<K>>),
    Value(Box<dyn Getter<K>>),
}

impl<K: ContextKind> Condition<K> {
    /// Evaluates the guard. `and`/`or` short-circuit left to right.
    pub fn evaluate(&self, ctx: &mut K::Ctx<'_>) -> Result<bool, ExecutionError> {
        match self {
            Condition::Compare { left, op, right } => {
                let left = left.get(ctx)?;
                let right = right.get(ctx)?;
                Ok(compare(&left, *op, &right))
            }
            Condition::And(items) => {
                for item in items {
                    if !item.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(items) => {
                for item in items {
                    if item.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!inner.evaluate(ctx)?),
            Condition::Value(getter) => getter.get(ctx)?.into_bool(),
        }
    }
}

/// A condition used as an argument reads as a boolean.
impl<K: ContextKind> Getter<K> for Condition<K> {
    fn get(&self, ctx: &mut K::Ctx<'_>) -> Result<Value, ExecutionError> {
        self.evaluate(ctx).map(Value::Bool)
    }
}

/// Int and Double compare numerically. Ordering is only defined between
/// numbers and between strings; any other ordering comparison is false.
pub(crate) fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => equal(left, right),
        CompareOp::Ne => !equal(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            order(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => *a as f64 == *b,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
