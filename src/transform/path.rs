//! Path resolution: turns a [`PathAst`] into a typed accessor for one
//! context kind.

use std::fmt;
use std::marker::PhantomData;

use crate::ast::{Key, PathAst};
use crate::contexts::{ContextKind, FieldShape};
use crate::error::{BindError, ExecutionError};
use crate::value::Value;

use super::getter::{Getter, Setter};

/// A resolved field plus the keys to apply below it.
pub struct PathAccessor<K: ContextKind> {
    field: K::Field,
    keys: Vec<Key>,
    writable: bool,
    text: String,
    _kind: PhantomData<K>,
}

impl<K: ContextKind> fmt::Debug for PathAccessor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathAccessor")
            .field("context", &K::NAME)
            .field("path", &self.text)
            .field("field", &self.field)
            .finish()
    }
}

impl<K: ContextKind> PathAccessor<K> {
    pub fn field(&self) -> K::Field {
        self.field
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub(crate) fn require_writable(&self) -> Result<(), BindError> {
        if self.writable {
            Ok(())
        } else {
            Err(BindError::ReadOnly {
                context: K::NAME,
                path: self.text.clone(),
            })
        }
    }
}

/// Resolves `path` against context kind `K`.
///
/// Fails when the field is unknown or when the first key does not fit the
/// field's shape: keys on a scalar, an int key on a map, a string key on a
/// slice.
pub fn resolve_path<K: ContextKind>(path: &PathAst) -> Result<PathAccessor<K>, BindError> {
    let spec = K::parse_field(path)?;
    let text = path.to_string();

    let reason = match (spec.shape, path.keys.first()) {
        (_, None) | (FieldShape::Any, _) => None,
        (FieldShape::Scalar, Some(_)) => Some("field does not accept keys"),
        (FieldShape::Map, Some(Key::Int(_))) => Some("map fields are indexed by string keys"),
        (FieldShape::Slice, Some(Key::String(_))) => Some("slice fields are indexed by int keys"),
        (FieldShape::Map, Some(Key::String(_))) | (FieldShape::Slice, Some(Key::Int(_))) => None,
    };
    if let Some(reason) = reason {
        return Err(BindError::InvalidKey {
            path: text,
            reason: reason.to_string(),
        });
    }

    Ok(PathAccessor {
        field: spec.field,
        keys: path.keys.clone(),
        writable: spec.writable,
        text,
        _kind: PhantomData,
    })
}

impl<K: ContextKind> Getter<K> for PathAccessor<K> {
    fn get(&self, ctx: &mut K::Ctx<'_>) -> Result<Value, ExecutionError> {
        let value = K::get_field(ctx, self.field).map_err(|e| e.at_path(&self.text))?;
        if self.keys.is_empty() {
            return Ok(value);
        }
        value.index(&self.keys).map_err(|e| e.at_path(&self.text))
    }
}

impl<K: ContextKind> Setter<K> for PathAccessor<K> {
    fn set(&self, ctx: &mut K::Ctx<'_>, value: Value) -> Result<(), ExecutionError> {
        if !self.writable {
            return Err(ExecutionError::mismatch(
                "writable path",
                format!("read-only {}", self.text),
            ));
        }
        if self.keys.is_empty() {
            return K::set_field(ctx, self.field, value).map_err(|e| e.at_path(&self.text));
        }

        // Read-modify-write of the whole field. An unchanged value skips the
        // write so attribute lists keep their original entries.
        let mut current = K::get_field(ctx, self.field).map_err(|e| e.at_path(&self.text))?;
        if current.index(&self.keys).is_ok_and(|existing| existing == value) {
            return Ok(());
        }
        current
            .set_index(&self.keys, value)
            .map_err(|e| e.at_path(&self.text))?;
        K::set_field(ctx, self.field, current).map_err(|e| e.at_path(&self.text))
    }
}
