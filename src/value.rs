//! Dynamically typed values flowing through getters and setters.
//!
//! [`Value`] is the single currency of the engine: paths read record fields
//! into it, functions compute with it, and setters write it back after a pass
//! through [`Value::coerce`], the one place where conversions between types
//! are decided.

use std::fmt;

use indexmap::IndexMap;
use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, ArrayValue, KeyValue, KeyValueList,
};
use serde_json::Value as JsonValue;

use crate::ast::Key;
use crate::error::ExecutionError;

/// Insertion-ordered string map, mirroring OTLP attribute lists.
pub type Map = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Slice(Vec<Value>),
    Map(Map),
}

/// Target type of a coercion. `Any` accepts every value unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Nil,
    Bool,
    Int,
    Double,
    String,
    Bytes,
    Slice,
    Map,
    Any,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Nil => "nil",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Slice => "slice",
            ValueType::Map => "map",
            ValueType::Any => "any",
        })
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Slice(_) => ValueType::Slice,
            Value::Map(_) => ValueType::Map,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Converts `self` to `target` according to the coercion table.
    ///
    /// Identity conversions and `Any` always succeed. The only widening is
    /// `Int -> Double`; every other pair is a [`ExecutionError::TypeMismatch`].
    pub fn coerce(self, target: ValueType) -> Result<Value, ExecutionError> {
        match (self, target) {
            (value, ValueType::Any) => Ok(value),
            (Value::Nil, ValueType::Nil) => Ok(Value::Nil),
            (Value::Bool(b), ValueType::Bool) => Ok(Value::Bool(b)),
            (Value::Int(i), ValueType::Int) => Ok(Value::Int(i)),
            (Value::Int(i), ValueType::Double) => Ok(Value::Double(i as f64)),
            (Value::Double(d), ValueType::Double) => Ok(Value::Double(d)),
            (Value::String(s), ValueType::String) => Ok(Value::String(s)),
            (Value::Bytes(b), ValueType::Bytes) => Ok(Value::Bytes(b)),
            (Value::Slice(s), ValueType::Slice) => Ok(Value::Slice(s)),
            (Value::Map(m), ValueType::Map) => Ok(Value::Map(m)),
            (value, target) => Err(ExecutionError::mismatch(target, value.value_type())),
        }
    }

    pub fn into_bool(self) -> Result<bool, ExecutionError> {
        match self.coerce(ValueType::Bool)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExecutionError::mismatch(ValueType::Bool, other.value_type())),
        }
    }

    pub fn into_i64(self) -> Result<i64, ExecutionError> {
        match self.coerce(ValueType::Int)? {
            Value::Int(i) => Ok(i),
            other => Err(ExecutionError::mismatch(ValueType::Int, other.value_type())),
        }
    }

    pub fn into_f64(self) -> Result<f64, ExecutionError> {
        match self.coerce(ValueType::Double)? {
            Value::Double(d) => Ok(d),
            other => Err(ExecutionError::mismatch(ValueType::Double, other.value_type())),
        }
    }

    pub fn into_string(self) -> Result<String, ExecutionError> {
        match self.coerce(ValueType::String)? {
            Value::String(s) => Ok(s),
            other => Err(ExecutionError::mismatch(ValueType::String, other.value_type())),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, ExecutionError> {
        match self.coerce(ValueType::Bytes)? {
            Value::Bytes(b) => Ok(b),
            other => Err(ExecutionError::mismatch(ValueType::Bytes, other.value_type())),
        }
    }

    pub fn into_slice(self) -> Result<Vec<Value>, ExecutionError> {
        match self.coerce(ValueType::Slice)? {
            Value::Slice(s) => Ok(s),
            other => Err(ExecutionError::mismatch(ValueType::Slice, other.value_type())),
        }
    }

    pub fn into_map(self) -> Result<Map, ExecutionError> {
        match self.coerce(ValueType::Map)? {
            Value::Map(m) => Ok(m),
            other => Err(ExecutionError::mismatch(ValueType::Map, other.value_type())),
        }
    }

    /// Int narrowed to an unsigned protobuf field.
    pub fn into_u64(self) -> Result<u64, ExecutionError> {
        let i = self.into_i64()?;
        u64::try_from(i).map_err(|_| ExecutionError::mismatch("non-negative int", i))
    }

    pub fn into_u32(self) -> Result<u32, ExecutionError> {
        let i = self.into_i64()?;
        u32::try_from(i).map_err(|_| ExecutionError::mismatch("int in u32 range", i))
    }

    pub fn into_i32(self) -> Result<i32, ExecutionError> {
        let i = self.into_i64()?;
        i32::try_from(i).map_err(|_| ExecutionError::mismatch("int in i32 range", i))
    }

    /// Reads the value under `keys`. Missing map keys read as `Nil`.
    pub fn index(&self, keys: &[Key]) -> Result<Value, ExecutionError> {
        let mut current = self;
        for key in keys {
            current = match (current, key) {
                (Value::Nil, _) => return Ok(Value::Nil),
                (Value::Map(map), Key::String(k)) => match map.get(k) {
                    Some(v) => v,
                    None => return Ok(Value::Nil),
                },
                (Value::Slice(items), Key::Int(i)) => slice_get(items, *i)
                    .ok_or_else(|| ExecutionError::not_found(key.to_string()))?,
                (Value::Map(_), Key::Int(_)) => {
                    return Err(ExecutionError::mismatch("slice", ValueType::Map))
                }
                (other, _) => return Err(ExecutionError::mismatch(key_target(key), other.value_type())),
            };
        }
        Ok(current.clone())
    }

    /// Writes `value` under `keys`, creating intermediate maps for missing
    /// string keys.
    pub fn set_index(&mut self, keys: &[Key], value: Value) -> Result<(), ExecutionError> {
        let Some((key, rest)) = keys.split_first() else {
            *self = value;
            return Ok(());
        };

        if self.is_nil() && matches!(key, Key::String(_)) {
            *self = Value::Map(Map::new());
        }

        match (self, key) {
            (Value::Map(map), Key::String(k)) => {
                if rest.is_empty() {
                    map.insert(k.clone(), value);
                    return Ok(());
                }
                if !map.contains_key(k) {
                    if !matches!(rest.first(), Some(Key::String(_))) {
                        return Err(ExecutionError::not_found(key.to_string()));
                    }
                    map.insert(k.clone(), Value::Map(Map::new()));
                }
                match map.get_mut(k) {
                    Some(child) => child.set_index(rest, value),
                    None => Err(ExecutionError::not_found(key.to_string())),
                }
            }
            (Value::Slice(items), Key::Int(i)) => {
                let len = items.len();
                match usize::try_from(*i).ok().filter(|idx| *idx < len) {
                    Some(idx) => items[idx].set_index(rest, value),
                    None => Err(ExecutionError::not_found(key.to_string())),
                }
            }
            (other, key) => Err(ExecutionError::mismatch(key_target(key), other.value_type())),
        }
    }

    /// Lossy JSON view used for rendering maps and slices.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Nil => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => JsonValue::String(const_hex::encode(b)),
            Value::Slice(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Renders values the way string concatenation sees them.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&const_hex::encode(b)),
            Value::Slice(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

fn slice_get(items: &[Value], index: i64) -> Option<&Value> {
    usize::try_from(index).ok().and_then(|i| items.get(i))
}

fn key_target(key: &Key) -> ValueType {
    match key {
        Key::String(_) => ValueType::Map,
        Key::Int(_) => ValueType::Slice,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

/// Integers that fit `i64` stay integers; every other number is a double.
impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Nil,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Double).unwrap_or_default(),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Slice(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// ============================================================================
// OTLP conversions
// ============================================================================

impl From<&AnyValue> for Value {
    fn from(av: &AnyValue) -> Self {
        match av.value.as_ref() {
            Some(any_value::Value::StringValue(s)) => Value::String(s.clone()),
            Some(any_value::Value::BoolValue(b)) => Value::Bool(*b),
            Some(any_value::Value::IntValue(i)) => Value::Int(*i),
            Some(any_value::Value::DoubleValue(d)) => Value::Double(*d),
            Some(any_value::Value::ArrayValue(arr)) => {
                Value::Slice(arr.values.iter().map(Value::from).collect())
            }
            Some(any_value::Value::KvlistValue(kvlist)) => Value::Map(attributes_to_map(&kvlist.values)),
            Some(any_value::Value::BytesValue(bytes)) => Value::Bytes(bytes.clone()),
            None => Value::Nil,
        }
    }
}

impl From<Value> for AnyValue {
    fn from(value: Value) -> Self {
        let value = match value {
            Value::Nil => None,
            Value::Bool(b) => Some(any_value::Value::BoolValue(b)),
            Value::Int(i) => Some(any_value::Value::IntValue(i)),
            Value::Double(d) => Some(any_value::Value::DoubleValue(d)),
            Value::String(s) => Some(any_value::Value::StringValue(s)),
            Value::Bytes(b) => Some(any_value::Value::BytesValue(b)),
            Value::Slice(items) => Some(any_value::Value::ArrayValue(ArrayValue {
                values: items.into_iter().map(AnyValue::from).collect(),
            })),
            Value::Map(map) => Some(any_value::Value::KvlistValue(KeyValueList {
                values: map_to_attributes(map),
            })),
        };
        AnyValue { value }
    }
}

/// Converts an OTLP attribute list into a map. Later duplicates win.
///
/// Writing the map back produces one entry per key, so any edit that
/// changes an attribute list also drops its duplicate keys.
pub fn attributes_to_map(attrs: &[KeyValue]) -> Map {
    attrs
        .iter()
        .map(|kv| {
            let value = kv.value.as_ref().map(Value::from).unwrap_or_default();
            (kv.key.clone(), value)
        })
        .collect()
}

pub fn map_to_attributes(map: Map) -> Vec<KeyValue> {
    map.into_iter()
        .map(|(key, value)| KeyValue {
            key,
            value: Some(AnyValue::from(value)),
        })
        .collect()
}
