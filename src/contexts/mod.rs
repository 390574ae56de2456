//! Context adapters, one per telemetry record kind.
//!
//! A context borrows a single record together with its enclosing resource and
//! instrumentation scope for the duration of one evaluation. Each record kind
//! is described by a zero-sized marker implementing [`ContextKind`]; the
//! marker names the borrowed context type, its field set, and how fields are
//! read and written. Statements, getters and functions are generic over the
//! marker, so adding a record kind means adding one module here.

use std::fmt;

use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;

use crate::ast::PathAst;
use crate::error::{BindError, ExecutionError};
use crate::value::{attributes_to_map, map_to_attributes, Value};

pub mod datapoint;
pub mod log;
pub mod resource;
pub mod span;

pub use datapoint::{for_each_data_point, DataPointContext, DataPointField, DataPointKind};
pub use log::{for_each_log_record, LogContext, LogField, LogKind};
pub use resource::{for_each_resource, ResourceContext, ResourceKind};
pub use span::{for_each_span, SpanContext, SpanField, SpanKind};

/// Capability surface shared by every context: access to the enclosing
/// resource and instrumentation scope.
pub trait TelemetryContext {
    fn resource(&self) -> Option<&Resource>;

    /// Creates an empty resource when the record has none.
    fn resource_mut(&mut self) -> &mut Resource;

    fn scope(&self) -> Option<&InstrumentationScope>;

    /// `None` when the context kind has no scope at all.
    fn scope_mut(&mut self) -> Option<&mut InstrumentationScope>;
}

/// A telemetry record kind the engine can bind statements against.
pub trait ContextKind: fmt::Debug + Sized + Send + Sync + 'static {
    /// The per-record context, borrowing the record for `'a`.
    type Ctx<'a>: TelemetryContext;

    /// Resolved field identifiers for this kind.
    type Field: Copy + fmt::Debug + PartialEq + Send + Sync + 'static;

    /// Name used in configuration and error messages.
    const NAME: &'static str;

    /// Resolves the field portion of a path. Keys are validated by the caller
    /// against the returned [`FieldShape`].
    fn parse_field(path: &PathAst) -> Result<FieldSpec<Self::Field>, BindError>;

    fn get_field(ctx: &Self::Ctx<'_>, field: Self::Field) -> Result<Value, ExecutionError>;

    fn set_field(
        ctx: &mut Self::Ctx<'_>,
        field: Self::Field,
        value: Value,
    ) -> Result<(), ExecutionError>;
}

/// What kind of keys a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// No keys.
    Scalar,
    /// First key must be a string.
    Map,
    /// First key must be an int.
    Slice,
    /// Any key.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec<F> {
    pub field: F,
    pub shape: FieldShape,
    pub writable: bool,
}

impl<F> FieldSpec<F> {
    pub fn scalar(field: F) -> Self {
        Self::with_shape(field, FieldShape::Scalar)
    }

    pub fn map(field: F) -> Self {
        Self::with_shape(field, FieldShape::Map)
    }

    pub fn slice(field: F) -> Self {
        Self::with_shape(field, FieldShape::Slice)
    }

    pub fn any(field: F) -> Self {
        Self::with_shape(field, FieldShape::Any)
    }

    fn with_shape(field: F, shape: FieldShape) -> Self {
        Self {
            field,
            shape,
            writable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn map_field<G>(self, f: impl FnOnce(F) -> G) -> FieldSpec<G> {
        FieldSpec {
            field: f(self.field),
            shape: self.shape,
            writable: self.writable,
        }
    }
}

pub(crate) fn unknown_path<K: ContextKind>(path: &PathAst) -> BindError {
    BindError::UnknownPath {
        context: K::NAME,
        path: path.to_string(),
    }
}

// ============================================================================
// Resource and scope fields shared by the record contexts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceField {
    Attributes,
    DroppedAttributesCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeField {
    Name,
    Version,
    Attributes,
    DroppedAttributesCount,
}

/// Virtual fields reaching out of the record into its resource or scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonField {
    Resource(ResourceField),
    Scope(ScopeField),
}

pub(crate) fn parse_resource_field(name: &str) -> Option<FieldSpec<ResourceField>> {
    match name {
        "attributes" => Some(FieldSpec::map(ResourceField::Attributes)),
        "dropped_attributes_count" => Some(FieldSpec::scalar(ResourceField::DroppedAttributesCount)),
        _ => None,
    }
}

/// Resolves `resource.*` and `instrumentation_scope.*` names.
pub(crate) fn parse_common_field(name: &str) -> Option<FieldSpec<CommonField>> {
    if let Some(rest) = name.strip_prefix("resource.") {
        return parse_resource_field(rest).map(|spec| spec.map_field(CommonField::Resource));
    }
    let rest = name.strip_prefix("instrumentation_scope.")?;
    let spec = match rest {
        "name" => FieldSpec::scalar(ScopeField::Name),
        "version" => FieldSpec::scalar(ScopeField::Version),
        "attributes" => FieldSpec::map(ScopeField::Attributes),
        "dropped_attributes_count" => FieldSpec::scalar(ScopeField::DroppedAttributesCount),
        _ => return None,
    };
    Some(spec.map_field(CommonField::Scope))
}

pub(crate) fn get_resource_field(resource: Option<&Resource>, field: ResourceField) -> Value {
    match field {
        ResourceField::Attributes => Value::Map(
            resource
                .map(|r| attributes_to_map(&r.attributes))
                .unwrap_or_default(),
        ),
        ResourceField::DroppedAttributesCount => Value::Int(
            resource
                .map(|r| i64::from(r.dropped_attributes_count))
                .unwrap_or_default(),
        ),
    }
}

pub(crate) fn set_resource_field(
    resource: &mut Resource,
    field: ResourceField,
    value: Value,
) -> Result<(), ExecutionError> {
    match field {
        ResourceField::Attributes => resource.attributes = map_to_attributes(value.into_map()?),
        ResourceField::DroppedAttributesCount => {
            resource.dropped_attributes_count = value.into_u32()?
        }
    }
    Ok(())
}

pub(crate) fn get_common_field<C: TelemetryContext>(ctx: &C, field: CommonField) -> Value {
    match field {
        CommonField::Resource(f) => get_resource_field(ctx.resource(), f),
        CommonField::Scope(f) => {
            let scope = ctx.scope();
            match f {
                ScopeField::Name => Value::String(scope.map(|s| s.name.clone()).unwrap_or_default()),
                ScopeField::Version => {
                    Value::String(scope.map(|s| s.version.clone()).unwrap_or_default())
                }
                ScopeField::Attributes => Value::Map(
                    scope
                        .map(|s| attributes_to_map(&s.attributes))
                        .unwrap_or_default(),
                ),
                ScopeField::DroppedAttributesCount => Value::Int(
                    scope
                        .map(|s| i64::from(s.dropped_attributes_count))
                        .unwrap_or_default(),
                ),
            }
        }
    }
}

pub(crate) fn set_common_field<C: TelemetryContext>(
    ctx: &mut C,
    field: CommonField,
    value: Value,
) -> Result<(), ExecutionError> {
    match field {
        CommonField::Resource(f) => set_resource_field(ctx.resource_mut(), f, value),
        CommonField::Scope(f) => {
            let scope = ctx
                .scope_mut()
                .ok_or_else(|| ExecutionError::not_found("instrumentation_scope"))?;
            match f {
                ScopeField::Name => scope.name = value.into_string()?,
                ScopeField::Version => scope.version = value.into_string()?,
                ScopeField::Attributes => scope.attributes = map_to_attributes(value.into_map()?),
                ScopeField::DroppedAttributesCount => {
                    scope.dropped_attributes_count = value.into_u32()?
                }
            }
            Ok(())
        }
    }
}

/// Timestamps above `i64::MAX` (year 2262) saturate.
pub(crate) fn unsigned(v: u64) -> Value {
    Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
}

/// Hex rendering used by the `*.string` id paths.
pub(crate) fn id_to_hex(id: &[u8]) -> Value {
    Value::String(const_hex::encode(id))
}

/// Parses a hex id of exactly `len` bytes.
pub(crate) fn hex_to_id(value: Value, len: usize) -> Result<Vec<u8>, ExecutionError> {
    let text = value.into_string()?;
    match const_hex::decode(&text) {
        Ok(bytes) if bytes.len() == len => Ok(bytes),
        _ => Err(ExecutionError::mismatch(
            format!("{}-character hex id", len * 2),
            format!("{text:?}"),
        )),
    }
}

/// Raw id bytes; empty clears the id.
pub(crate) fn bytes_to_id(value: Value, len: usize) -> Result<Vec<u8>, ExecutionError> {
    let bytes = value.into_bytes()?;
    if bytes.is_empty() || bytes.len() == len {
        Ok(bytes)
    } else {
        Err(ExecutionError::mismatch(
            format!("{len}-byte id"),
            format!("{} bytes", bytes.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_field() {
        assert_eq!(
            parse_common_field("resource.attributes"),
            Some(FieldSpec::map(CommonField::Resource(ResourceField::Attributes)))
        );
        assert_eq!(
            parse_common_field("instrumentation_scope.version"),
            Some(FieldSpec::scalar(CommonField::Scope(ScopeField::Version)))
        );
        assert_eq!(parse_common_field("resource.nope"), None);
        assert_eq!(parse_common_field("attributes"), None);
    }

    #[test]
    fn test_hex_to_id_checks_length() {
        let id = hex_to_id(Value::from("0102030405060708"), 8).unwrap();
        assert_eq!(id, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(hex_to_id(Value::from("0102"), 8).unwrap_err().is_type_mismatch());
        assert!(hex_to_id(Value::from("zz"), 1).unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_bytes_to_id_allows_clearing() {
        assert_eq!(bytes_to_id(Value::Bytes(vec![]), 16).unwrap(), Vec::<u8>::new());
        assert!(bytes_to_id(Value::Bytes(vec![1]), 16).is_err());
    }
}
