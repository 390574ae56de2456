//! Read/write primitives shared by statements, conditions and functions.

use std::fmt;

use crate::contexts::ContextKind;
use crate::error::ExecutionError;
use crate::value::Value;

use super::path::PathAccessor;

/// Reads a value out of a context.
///
/// Takes the context mutably because a getter may be a nested function call,
/// and functions are allowed to mutate the record they run against.
pub trait Getter<K: ContextKind>: fmt::Debug + Send + Sync {
    fn get(&self, ctx: &mut K::Ctx<'_>) -> Result<Value, ExecutionError>;
}

/// Writes a value into a context.
pub trait Setter<K: ContextKind>: fmt::Debug + Send + Sync {
    fn set(&self, ctx: &mut K::Ctx<'_>, value: Value) -> Result<(), ExecutionError>;
}

/// A path that can be both read and written.
pub trait GetSetter<K: ContextKind>: Getter<K> + Setter<K> {}

impl<K: ContextKind, T: Getter<K> + Setter<K>> GetSetter<K> for T {}

/// The subject of an in-place edit.
///
/// Any value can be read. The edited value is written back only through a
/// writable path; for read-only paths and computed values the write is a
/// no-op.
#[derive(Debug)]
pub enum Target<K: ContextKind> {
    Path(PathAccessor<K>),
    Value(Box<dyn Getter<K>>),
}

impl<K: ContextKind> Target<K> {
    pub fn write_back(&self, ctx: &mut K::Ctx<'_>, value: Value) -> Result<(), ExecutionError> {
        match self {
            Target::Path(path) if path.is_writable() => path.set(ctx, value),
            _ => Ok(()),
        }
    }
}

impl<K: ContextKind> Getter<K> for Target<K> {
    fn get(&self, ctx: &mut K::Ctx<'_>) -> Result<Value, ExecutionError> {
        match self {
            Target::Path(path) => path.get(ctx),
            Target::Value(getter) => getter.get(ctx),
        }
    }
}

/// A bound, invocable function.
///
/// `Ok(None)` means the function produced nothing, either because it only
/// mutates the record or because its precondition did not hold.
pub trait ExprFunc<K: ContextKind>: fmt::Debug + Send + Sync {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError>;
}

/// A constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal(pub Value);

impl<K: ContextKind> Getter<K> for Literal {
    fn get(&self, _ctx: &mut K::Ctx<'_>) -> Result<Value, ExecutionError> {
        Ok(self.0.clone())
    }
}

/// A nested function call used as an argument. Evaluated lazily on every
/// `get`; producing nothing reads as `Nil`.
#[derive(Debug)]
pub struct FunctionGetter<K: ContextKind> {
    pub(crate) func: Box<dyn ExprFunc<K>>,
}

impl<K: ContextKind> Getter<K> for FunctionGetter<K> {
    fn get(&self, ctx: &mut K::Ctx<'_>) -> Result<Value, ExecutionError> {
        Ok(self.func.invoke(ctx)?.unwrap_or_default())
    }
}

/// A list literal whose items may be any getter.
#[derive(Debug)]
pub struct ListGetter<K: ContextKind> {
    pub(crate) items: Vec<Box<dyn Getter<K>>>,
}

impl<K: ContextKind> Getter<K> for ListGetter<K> {
    fn get(&self, ctx: &mut K::Ctx<'_>) -> Result<Value, ExecutionError> {
        self.items
            .iter()
            .map(|item| item.get(ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Slice)
    }
}
