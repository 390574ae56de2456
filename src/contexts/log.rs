//! Log record context.

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;

use super::{
    bytes_to_id, get_common_field, hex_to_id, id_to_hex, parse_common_field, set_common_field,
    unknown_path, unsigned, CommonField, ContextKind, FieldSpec, TelemetryContext,
};
use crate::ast::PathAst;
use crate::error::{BindError, ExecutionError};
use crate::value::{attributes_to_map, map_to_attributes, Value};

/// One log record plus its scope and resource.
pub struct LogContext<'a> {
    record: &'a mut LogRecord,
    scope: &'a mut Option<InstrumentationScope>,
    resource: &'a mut Option<Resource>,
}

impl<'a> LogContext<'a> {
    pub fn new(
        record: &'a mut LogRecord,
        scope: &'a mut Option<InstrumentationScope>,
        resource: &'a mut Option<Resource>,
    ) -> Self {
        Self {
            record,
            scope,
            resource,
        }
    }

    pub fn record(&self) -> &LogRecord {
        self.record
    }
}

impl TelemetryContext for LogContext<'_> {
    fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    fn resource_mut(&mut self) -> &mut Resource {
        self.resource.get_or_insert_with(Resource::default)
    }

    fn scope(&self) -> Option<&InstrumentationScope> {
        self.scope.as_ref()
    }

    fn scope_mut(&mut self) -> Option<&mut InstrumentationScope> {
        Some(self.scope.get_or_insert_with(InstrumentationScope::default))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogField {
    TimeUnixNano,
    ObservedTimeUnixNano,
    SeverityNumber,
    SeverityText,
    Body,
    Attributes,
    DroppedAttributesCount,
    Flags,
    TraceId,
    TraceIdString,
    SpanId,
    SpanIdString,
    Common(CommonField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogKind;

impl ContextKind for LogKind {
    type Ctx<'a> = LogContext<'a>;
    type Field = LogField;

    const NAME: &'static str = "log";

    fn parse_field(path: &PathAst) -> Result<FieldSpec<LogField>, BindError> {
        let name = path.name();
        let spec = match name.as_str() {
            "time_unix_nano" => FieldSpec::scalar(LogField::TimeUnixNano),
            "observed_time_unix_nano" => FieldSpec::scalar(LogField::ObservedTimeUnixNano),
            "severity_number" => FieldSpec::scalar(LogField::SeverityNumber),
            "severity_text" => FieldSpec::scalar(LogField::SeverityText),
            "body" => FieldSpec::any(LogField::Body),
            "attributes" => FieldSpec::map(LogField::Attributes),
            "dropped_attributes_count" => FieldSpec::scalar(LogField::DroppedAttributesCount),
            "flags" => FieldSpec::scalar(LogField::Flags),
            "trace_id" => FieldSpec::scalar(LogField::TraceId),
            "trace_id.string" => FieldSpec::scalar(LogField::TraceIdString),
            "span_id" => FieldSpec::scalar(LogField::SpanId),
            "span_id.string" => FieldSpec::scalar(LogField::SpanIdString),
            other => parse_common_field(other)
                .map(|spec| spec.map_field(LogField::Common))
                .ok_or_else(|| unknown_path::<Self>(path))?,
        };
        Ok(spec)
    }

    fn get_field(ctx: &Self::Ctx<'_>, field: LogField) -> Result<Value, ExecutionError> {
        let record = &*ctx.record;
        let value = match field {
            LogField::TimeUnixNano => unsigned(record.time_unix_nano),
            LogField::ObservedTimeUnixNano => unsigned(record.observed_time_unix_nano),
            LogField::SeverityNumber => Value::Int(i64::from(record.severity_number)),
            LogField::SeverityText => Value::String(record.severity_text.clone()),
            LogField::Body => record.body.as_ref().map(Value::from).unwrap_or_default(),
            LogField::Attributes => Value::Map(attributes_to_map(&record.attributes)),
            LogField::DroppedAttributesCount => {
                Value::Int(i64::from(record.dropped_attributes_count))
            }
            LogField::Flags => Value::Int(i64::from(record.flags)),
            LogField::TraceId => Value::Bytes(record.trace_id.clone()),
            LogField::TraceIdString => id_to_hex(&record.trace_id),
            LogField::SpanId => Value::Bytes(record.span_id.clone()),
            LogField::SpanIdString => id_to_hex(&record.span_id),
            LogField::Common(f) => get_common_field(ctx, f),
        };
        Ok(value)
    }

    fn set_field(
        ctx: &mut Self::Ctx<'_>,
        field: LogField,
        value: Value,
    ) -> Result<(), ExecutionError> {
        if let LogField::Common(f) = field {
            return set_common_field(ctx, f, value);
        }

        let record = &mut *ctx.record;
        match field {
            LogField::TimeUnixNano => record.time_unix_nano = value.into_u64()?,
            LogField::ObservedTimeUnixNano => record.observed_time_unix_nano = value.into_u64()?,
            LogField::SeverityNumber => record.severity_number = value.into_i32()?,
            LogField::SeverityText => record.severity_text = value.into_string()?,
            LogField::Body => {
                record.body = if value.is_nil() {
                    None
                } else {
                    Some(AnyValue::from(value))
                }
            }
            LogField::Attributes => record.attributes = map_to_attributes(value.into_map()?),
            LogField::DroppedAttributesCount => {
                record.dropped_attributes_count = value.into_u32()?
            }
            LogField::Flags => record.flags = value.into_u32()?,
            LogField::TraceId => record.trace_id = bytes_to_id(value, 16)?,
            LogField::TraceIdString => record.trace_id = hex_to_id(value, 16)?,
            LogField::SpanId => record.span_id = bytes_to_id(value, 8)?,
            LogField::SpanIdString => record.span_id = hex_to_id(value, 8)?,
            LogField::Common(_) => {}
        }
        Ok(())
    }
}

/// Visits every log record of a request with a fresh context.
pub fn for_each_log_record<F>(request: &mut ExportLogsServiceRequest, mut callback: F)
where
    F: FnMut(LogContext<'_>),
{
    for resource_logs in &mut request.resource_logs {
        let ResourceLogs {
            resource,
            scope_logs,
            ..
        } = resource_logs;
        for scope_logs in scope_logs.iter_mut() {
            let ScopeLogs {
                scope, log_records, ..
            } = scope_logs;
            for record in log_records.iter_mut() {
                callback(LogContext::new(record, scope, resource));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;
    use opentelemetry_proto::tonic::common::v1::any_value;

    fn record() -> LogRecord {
        LogRecord {
            severity_number: 9,
            severity_text: "INFO".into(),
            body: Some(AnyValue {
                value: Some(any_value::Value::StringValue("hello".into())),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_body_accepts_any_shape() {
        let mut record = record();
        let mut scope = None;
        let mut resource = None;
        let mut ctx = LogContext::new(&mut record, &mut scope, &mut resource);

        assert_eq!(
            LogKind::get_field(&ctx, LogField::Body).unwrap(),
            Value::from("hello")
        );

        let mut map = Map::new();
        map.insert("msg".into(), Value::from("structured"));
        LogKind::set_field(&mut ctx, LogField::Body, Value::Map(map.clone())).unwrap();
        assert_eq!(LogKind::get_field(&ctx, LogField::Body).unwrap(), Value::Map(map));

        LogKind::set_field(&mut ctx, LogField::Body, Value::Nil).unwrap();
        assert!(record.body.is_none());
    }

    #[test]
    fn test_resource_attributes_created_on_write() {
        let mut record = record();
        let mut scope = None;
        let mut resource = None;
        let mut ctx = LogContext::new(&mut record, &mut scope, &mut resource);

        let field = LogKind::parse_field(&PathAst::new(["resource", "attributes"]))
            .unwrap()
            .field;
        assert_eq!(LogKind::get_field(&ctx, field).unwrap(), Value::Map(Map::new()));

        let mut map = Map::new();
        map.insert("service.name".into(), Value::from("checkout"));
        LogKind::set_field(&mut ctx, field, Value::Map(map)).unwrap();

        let resource = resource.expect("resource created");
        assert_eq!(resource.attributes.len(), 1);
        assert_eq!(resource.attributes[0].key, "service.name");
    }

    #[test]
    fn test_severity_number_requires_int() {
        let mut record = record();
        let mut scope = None;
        let mut resource = None;
        let mut ctx = LogContext::new(&mut record, &mut scope, &mut resource);

        let err = LogKind::set_field(&mut ctx, LogField::SeverityNumber, Value::from("WARN"))
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(record.severity_number, 9);
    }
}
