//! Functions that remove or trim entries of a map-valued target.
//!
//! All of them read the target, edit the map and write it back only when
//! something actually changed. A target that is not a map is left alone.

use regex::Regex;

use crate::contexts::ContextKind;
use crate::error::{BindError, ExecutionError};
use crate::transform::getter::{ExprFunc, Getter, Target};
use crate::value::{Map, Value};

use super::{ArgumentList, Function, Parameter, ParameterKind};

const TARGET: Parameter = Parameter {
    keyword: "target",
    kind: ParameterKind::Target,
    required: true,
};

/// Reads the target and, if it is a map, applies `edit` and writes the map
/// back when `edit` reports a change.
fn edit_map<K: ContextKind>(
    target: &Target<K>,
    ctx: &mut K::Ctx<'_>,
    edit: impl FnOnce(&mut Map) -> bool,
) -> Result<Option<Value>, ExecutionError> {
    let Value::Map(mut map) = target.get(ctx)? else {
        return Ok(None);
    };
    if edit(&mut map) {
        target.write_back(ctx, Value::Map(map))?;
    }
    Ok(None)
}

fn non_negative(function: &str, keyword: &str, limit: i64) -> Result<usize, BindError> {
    usize::try_from(limit).map_err(|_| {
        BindError::invalid_argument(function, keyword, format!("must not be negative, got {limit}"))
    })
}

// --- delete_key ---
/// Remove one key from a map
#[derive(Clone, Copy, Debug)]
pub struct DeleteKey;

impl<K: ContextKind> Function<K> for DeleteKey {
    fn identifier(&self) -> &'static str {
        "delete_key"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            TARGET,
            Parameter {
                keyword: "key",
                kind: ParameterKind::String,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_target("target")?;
        let key = arguments.required_string("key")?;
        Ok(Box::new(DeleteKeyFn { target, key }))
    }
}

#[derive(Debug)]
struct DeleteKeyFn<K: ContextKind> {
    target: Target<K>,
    key: String,
}

impl<K: ContextKind> ExprFunc<K> for DeleteKeyFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        edit_map(&self.target, ctx, |map| {
            map.shift_remove(&self.key).is_some()
        })
    }
}

// --- delete_matching_keys ---
/// Remove every key matching a regex
#[derive(Clone, Copy, Debug)]
pub struct DeleteMatchingKeys;

impl<K: ContextKind> Function<K> for DeleteMatchingKeys {
    fn identifier(&self) -> &'static str {
        "delete_matching_keys"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            TARGET,
            Parameter {
                keyword: "pattern",
                kind: ParameterKind::String,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_target("target")?;
        let pattern = arguments.required_string("pattern")?;
        let pattern = compile_regex("delete_matching_keys", &pattern)?;
        Ok(Box::new(DeleteMatchingKeysFn { target, pattern }))
    }
}

#[derive(Debug)]
struct DeleteMatchingKeysFn<K: ContextKind> {
    target: Target<K>,
    pattern: Regex,
}

impl<K: ContextKind> ExprFunc<K> for DeleteMatchingKeysFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        edit_map(&self.target, ctx, |map| {
            let before = map.len();
            map.retain(|key, _| !self.pattern.is_match(key));
            map.len() != before
        })
    }
}

pub(super) fn compile_regex(function: &str, pattern: &str) -> Result<Regex, BindError> {
    Regex::new(pattern)
        .map_err(|e| BindError::invalid_argument(function, "pattern", e.to_string()))
}

// --- keep_keys ---
/// Remove every key not in the given list
#[derive(Clone, Copy, Debug)]
pub struct KeepKeys;

impl<K: ContextKind> Function<K> for KeepKeys {
    fn identifier(&self) -> &'static str {
        "keep_keys"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            TARGET,
            Parameter {
                keyword: "keys",
                kind: ParameterKind::StringList,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_target("target")?;
        let keys = arguments.required_string_list("keys")?;
        Ok(Box::new(KeepKeysFn { target, keys }))
    }
}

#[derive(Debug)]
struct KeepKeysFn<K: ContextKind> {
    target: Target<K>,
    keys: Vec<String>,
}

impl<K: ContextKind> ExprFunc<K> for KeepKeysFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        edit_map(&self.target, ctx, |map| {
            let before = map.len();
            map.retain(|key, _| self.keys.iter().any(|k| k == key));
            map.len() != before
        })
    }
}

// --- limit ---
/// Keep at most N entries, in their current order
#[derive(Clone, Copy, Debug)]
pub struct Limit;

impl<K: ContextKind> Function<K> for Limit {
    fn identifier(&self) -> &'static str {
        "limit"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            TARGET,
            Parameter {
                keyword: "limit",
                kind: ParameterKind::Int,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_target("target")?;
        let limit = non_negative("limit", "limit", arguments.required_int("limit")?)?;
        Ok(Box::new(LimitFn { target, limit }))
    }
}

#[derive(Debug)]
struct LimitFn<K: ContextKind> {
    target: Target<K>,
    limit: usize,
}

impl<K: ContextKind> ExprFunc<K> for LimitFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        edit_map(&self.target, ctx, |map| {
            if map.len() <= self.limit {
                return false;
            }
            map.truncate(self.limit);
            true
        })
    }
}

// --- truncate_all ---
/// Truncate every string value of a map to N bytes
#[derive(Clone, Copy, Debug)]
pub struct TruncateAll;

impl<K: ContextKind> Function<K> for TruncateAll {
    fn identifier(&self) -> &'static str {
        "truncate_all"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            TARGET,
            Parameter {
                keyword: "limit",
                kind: ParameterKind::Int,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_target("target")?;
        let limit = non_negative("truncate_all", "limit", arguments.required_int("limit")?)?;
        Ok(Box::new(TruncateAllFn { target, limit }))
    }
}

#[derive(Debug)]
struct TruncateAllFn<K: ContextKind> {
    target: Target<K>,
    limit: usize,
}

impl<K: ContextKind> ExprFunc<K> for TruncateAllFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        edit_map(&self.target, ctx, |map| {
            let mut changed = false;
            for value in map.values_mut() {
                if let Value::String(s) = value {
                    if s.len() > self.limit {
                        s.truncate(floor_char_boundary(s, self.limit));
                        changed = true;
                    }
                }
            }
            changed
        })
    }
}

/// Largest index `<= limit` that falls on a char boundary.
fn floor_char_boundary(s: &str, limit: usize) -> usize {
    let mut idx = limit.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
