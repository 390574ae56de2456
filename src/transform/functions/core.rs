//! General value functions: writing, string building and matching.

use regex::Regex;

use crate::contexts::ContextKind;
use crate::error::{BindError, ExecutionError};
use crate::transform::getter::{ExprFunc, GetSetter, Getter, Setter};
use crate::value::Value;

use super::keys::compile_regex;
use super::{ArgumentList, Function, Parameter, ParameterKind};

// --- set ---
/// Write a value to a path
#[derive(Clone, Copy, Debug)]
pub struct Set;

impl<K: ContextKind> Function<K> for Set {
    fn identifier(&self) -> &'static str {
        "set"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            Parameter {
                keyword: "target",
                kind: ParameterKind::Setter,
                required: true,
            },
            Parameter {
                keyword: "value",
                kind: ParameterKind::Getter,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_setter("target")?;
        let value = arguments.required_getter("value")?;
        Ok(Box::new(SetFn { target, value }))
    }
}

#[derive(Debug)]
struct SetFn<K: ContextKind> {
    target: Box<dyn Setter<K>>,
    value: Box<dyn Getter<K>>,
}

impl<K: ContextKind> ExprFunc<K> for SetFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        let value = self.value.get(ctx)?;
        // Nil means "no value", not "clear the field".
        if !value.is_nil() {
            self.target.set(ctx, value)?;
        }
        Ok(None)
    }
}

// --- concat ---
/// Join the string forms of several values
#[derive(Clone, Copy, Debug)]
pub struct Concat;

impl<K: ContextKind> Function<K> for Concat {
    fn identifier(&self) -> &'static str {
        "concat"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            Parameter {
                keyword: "values",
                kind: ParameterKind::GetterList,
                required: true,
            },
            Parameter {
                keyword: "delimiter",
                kind: ParameterKind::String,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let values = arguments.required_getter_list("values")?;
        let delimiter = arguments.required_string("delimiter")?;
        Ok(Box::new(ConcatFn { values, delimiter }))
    }
}

#[derive(Debug)]
struct ConcatFn<K: ContextKind> {
    values: Vec<Box<dyn Getter<K>>>,
    delimiter: String,
}

impl<K: ContextKind> ExprFunc<K> for ConcatFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        let mut parts = Vec::with_capacity(self.values.len());
        for value in &self.values {
            parts.push(value.get(ctx)?.to_string());
        }
        Ok(Some(Value::String(parts.join(&self.delimiter))))
    }
}

// --- is_match ---
/// Test a string against a regex
#[derive(Clone, Copy, Debug)]
pub struct IsMatch;

impl<K: ContextKind> Function<K> for IsMatch {
    fn identifier(&self) -> &'static str {
        "is_match"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            Parameter {
                keyword: "target",
                kind: ParameterKind::Getter,
                required: true,
            },
            Parameter {
                keyword: "pattern",
                kind: ParameterKind::String,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_getter("target")?;
        let pattern = compile_regex("is_match", &arguments.required_string("pattern")?)?;
        Ok(Box::new(IsMatchFn { target, pattern }))
    }
}

#[derive(Debug)]
struct IsMatchFn<K: ContextKind> {
    target: Box<dyn Getter<K>>,
    pattern: Regex,
}

impl<K: ContextKind> ExprFunc<K> for IsMatchFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        let matched = match self.target.get(ctx)? {
            Value::String(s) => self.pattern.is_match(&s),
            _ => false,
        };
        Ok(Some(Value::Bool(matched)))
    }
}

// --- replace_pattern ---
/// Regex replace on a string-valued path
#[derive(Clone, Copy, Debug)]
pub struct ReplacePattern;

impl<K: ContextKind> Function<K> for ReplacePattern {
    fn identifier(&self) -> &'static str {
        "replace_pattern"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            Parameter {
                keyword: "target",
                kind: ParameterKind::GetSetter,
                required: true,
            },
            Parameter {
                keyword: "pattern",
                kind: ParameterKind::String,
                required: true,
            },
            Parameter {
                keyword: "replacement",
                kind: ParameterKind::String,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_get_setter("target")?;
        let pattern = compile_regex("replace_pattern", &arguments.required_string("pattern")?)?;
        let replacement = arguments.required_string("replacement")?;
        Ok(Box::new(ReplacePatternFn {
            target,
            pattern,
            replacement,
        }))
    }
}

#[derive(Debug)]
struct ReplacePatternFn<K: ContextKind> {
    target: Box<dyn GetSetter<K>>,
    pattern: Regex,
    replacement: String,
}

impl<K: ContextKind> ExprFunc<K> for ReplacePatternFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        let Value::String(current) = self.target.get(ctx)? else {
            return Ok(None);
        };
        let replaced = self
            .pattern
            .replace_all(&current, self.replacement.as_str());
        if replaced != current {
            self.target.set(ctx, Value::String(replaced.into_owned()))?;
        }
        Ok(None)
    }
}

// --- parse_json ---
/// Parse a JSON string into a value
#[derive(Clone, Copy, Debug)]
pub struct ParseJson;

impl<K: ContextKind> Function<K> for ParseJson {
    fn identifier(&self) -> &'static str {
        "parse_json"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[Parameter {
            keyword: "target",
            kind: ParameterKind::Getter,
            required: true,
        }]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let target = arguments.required_getter("target")?;
        Ok(Box::new(ParseJsonFn { target }))
    }
}

#[derive(Debug)]
struct ParseJsonFn<K: ContextKind> {
    target: Box<dyn Getter<K>>,
}

impl<K: ContextKind> ExprFunc<K> for ParseJsonFn<K> {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        let text = self.target.get(ctx)?.into_string()?;
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ExecutionError::Function {
                function: "parse_json",
                source: Box::new(e),
            })?;
        Ok(Some(Value::from(json)))
    }
}
