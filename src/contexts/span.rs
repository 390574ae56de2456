//! Span context.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};

use super::{
    bytes_to_id, get_common_field, hex_to_id, id_to_hex, parse_common_field, set_common_field,
    unknown_path, unsigned, CommonField, ContextKind, FieldSpec, TelemetryContext,
};
use crate::ast::PathAst;
use crate::error::{BindError, ExecutionError};
use crate::value::{attributes_to_map, map_to_attributes, Value};

const TRACE_ID_LEN: usize = 16;
const SPAN_ID_LEN: usize = 8;

/// One span plus its scope and resource.
pub struct SpanContext<'a> {
    span: &'a mut Span,
    scope: &'a mut Option<InstrumentationScope>,
    resource: &'a mut Option<Resource>,
}

impl<'a> SpanContext<'a> {
    pub fn new(
        span: &'a mut Span,
        scope: &'a mut Option<InstrumentationScope>,
        resource: &'a mut Option<Resource>,
    ) -> Self {
        Self {
            span,
            scope,
            resource,
        }
    }

    pub fn span(&self) -> &Span {
        self.span
    }

    pub fn span_mut(&mut self) -> &mut Span {
        self.span
    }
}

impl TelemetryContext for SpanContext<'_> {
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
pub enum SpanField {
    TraceId,
    TraceIdString,
    SpanId,
    SpanIdString,
    ParentSpanId,
    ParentSpanIdString,
    TraceState,
    Name,
    Kind,
    StartTimeUnixNano,
    EndTimeUnixNano,
    Attributes,
    DroppedAttributesCount,
    DroppedEventsCount,
    DroppedLinksCount,
    StatusCode,
    StatusMessage,
    Flags,
    Common(CommonField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanKind;

impl ContextKind for SpanKind {
    type Ctx<'a> = SpanContext<'a>;
    type Field = SpanField;

    const NAME: &'static str = "span";

    fn parse_field(path: &PathAst) -> Result<FieldSpec<SpanField>, BindError> {
        let name = path.name();
        let spec = match name.as_str() {
            "trace_id" => FieldSpec::scalar(SpanField::TraceId),
            "trace_id.string" => FieldSpec::scalar(SpanField::TraceIdString),
            "span_id" => FieldSpec::scalar(SpanField::SpanId),
            "span_id.string" => FieldSpec::scalar(SpanField::SpanIdString),
            "parent_span_id" => FieldSpec::scalar(SpanField::ParentSpanId),
            "parent_span_id.string" => FieldSpec::scalar(SpanField::ParentSpanIdString),
            "trace_state" => FieldSpec::scalar(SpanField::TraceState),
            "name" => FieldSpec::scalar(SpanField::Name),
            "kind" => FieldSpec::scalar(SpanField::Kind),
            "start_time_unix_nano" => FieldSpec::scalar(SpanField::StartTimeUnixNano),
            "end_time_unix_nano" => FieldSpec::scalar(SpanField::EndTimeUnixNano),
            "attributes" => FieldSpec::map(SpanField::Attributes),
            "dropped_attributes_count" => FieldSpec::scalar(SpanField::DroppedAttributesCount),
            "dropped_events_count" => FieldSpec::scalar(SpanField::DroppedEventsCount),
            "dropped_links_count" => FieldSpec::scalar(SpanField::DroppedLinksCount),
            "status.code" => FieldSpec::scalar(SpanField::StatusCode),
            "status.message" => FieldSpec::scalar(SpanField::StatusMessage),
            "flags" => FieldSpec::scalar(SpanField::Flags),
            other => parse_common_field(other)
                .map(|spec| spec.map_field(SpanField::Common))
                .ok_or_else(|| unknown_path::<Self>(path))?,
        };
        Ok(spec)
    }

    fn get_field(ctx: &Self::Ctx<'_>, field: SpanField) -> Result<Value, ExecutionError> {
        let span = &*ctx.span;
        let value = match field {
            SpanField::TraceId => Value::Bytes(span.trace_id.clone()),
            SpanField::TraceIdString => id_to_hex(&span.trace_id),
            SpanField::SpanId => Value::Bytes(span.span_id.clone()),
            SpanField::SpanIdString => id_to_hex(&span.span_id),
            SpanField::ParentSpanId => Value::Bytes(span.parent_span_id.clone()),
            SpanField::ParentSpanIdString => id_to_hex(&span.parent_span_id),
            SpanField::TraceState => Value::String(span.trace_state.clone()),
            SpanField::Name => Value::String(span.name.clone()),
            SpanField::Kind => Value::Int(i64::from(span.kind)),
            SpanField::StartTimeUnixNano => unsigned(span.start_time_unix_nano),
            SpanField::EndTimeUnixNano => unsigned(span.end_time_unix_nano),
            SpanField::Attributes => Value::Map(attributes_to_map(&span.attributes)),
            SpanField::DroppedAttributesCount => Value::Int(i64::from(span.dropped_attributes_count)),
            SpanField::DroppedEventsCount => Value::Int(i64::from(span.dropped_events_count)),
            SpanField::DroppedLinksCount => Value::Int(i64::from(span.dropped_links_count)),
            SpanField::StatusCode => Value::Int(
                span.status
                    .as_ref()
                    .map(|s| i64::from(s.code))
                    .unwrap_or_default(),
            ),
            SpanField::StatusMessage => Value::String(
                span.status
                    .as_ref()
                    .map(|s| s.message.clone())
                    .unwrap_or_default(),
            ),
            SpanField::Flags => Value::Int(i64::from(span.flags)),
            SpanField::Common(f) => get_common_field(ctx, f),
        };
        Ok(value)
    }

    fn set_field(
        ctx: &mut Self::Ctx<'_>,
        field: SpanField,
        value: Value,
    ) -> Result<(), ExecutionError> {
        if let SpanField::Common(f) = field {
            return set_common_field(ctx, f, value);
        }

        let span = &mut *ctx.span;
        match field {
            SpanField::TraceId => span.trace_id = bytes_to_id(value, TRACE_ID_LEN)?,
            SpanField::TraceIdString => span.trace_id = hex_to_id(value, TRACE_ID_LEN)?,
            SpanField::SpanId => span.span_id = bytes_to_id(value, SPAN_ID_LEN)?,
            SpanField::SpanIdString => span.span_id = hex_to_id(value, SPAN_ID_LEN)?,
            SpanField::ParentSpanId => span.parent_span_id = bytes_to_id(value, SPAN_ID_LEN)?,
            SpanField::ParentSpanIdString => {
                span.parent_span_id = hex_to_id(value, SPAN_ID_LEN)?
            }
            SpanField::TraceState => span.trace_state = value.into_string()?,
            SpanField::Name => span.name = value.into_string()?,
            SpanField::Kind => span.kind = value.into_i32()?,
            SpanField::StartTimeUnixNano => span.start_time_unix_nano = value.into_u64()?,
            SpanField::EndTimeUnixNano => span.end_time_unix_nano = value.into_u64()?,
            SpanField::Attributes => span.attributes = map_to_attributes(value.into_map()?),
            SpanField::DroppedAttributesCount => span.dropped_attributes_count = value.into_u32()?,
            SpanField::DroppedEventsCount => span.dropped_events_count = value.into_u32()?,
            SpanField::DroppedLinksCount => span.dropped_links_count = value.into_u32()?,
            SpanField::StatusCode => {
                let code = value.into_i32()?;
                span.status.get_or_insert_with(Default::default).code = code;
            }
            SpanField::StatusMessage => {
                let message = value.into_string()?;
                span.status.get_or_insert_with(Default::default).message = message;
            }
            SpanField::Flags => span.flags = value.into_u32()?,
            SpanField::Common(_) => {}
        }
        Ok(())
    }
}

/// Visits every span of a request with a fresh context.
pub fn for_each_span<F>(request: &mut ExportTraceServiceRequest, mut callback: F)
where
    F: FnMut(SpanContext<'_>),
{
    for resource_spans in &mut request.resource_spans {
        let ResourceSpans {
            resource,
            scope_spans,
            ..
        } = resource_spans;
        for scope_spans in scope_spans.iter_mut() {
            let ScopeSpans { scope, spans, .. } = scope_spans;
            for span in spans.iter_mut() {
                callback(SpanContext::new(span, scope, resource));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::{ResourceField, ScopeField};
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};

    fn span() -> Span {
        Span {
            trace_id: vec![0xab; 16],
            span_id: vec![1, 2, 3, 4, 5, 6, 7, 8],
            name: "GET /users".into(),
            kind: 2,
            start_time_unix_nano: 100,
            end_time_unix_nano: 250,
            attributes: vec![KeyValue {
                key: "http.method".into(),
                value: Some(AnyValue {
                    value: Some(any_value::Value::StringValue("GET".into())),
                }),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_field_known_and_unknown() {
        let spec = SpanKind::parse_field(&PathAst::new(["status", "code"])).unwrap();
        assert_eq!(spec, FieldSpec::scalar(SpanField::StatusCode));

        let spec = SpanKind::parse_field(&PathAst::new(["resource", "attributes"])).unwrap();
        assert_eq!(
            spec,
            FieldSpec::map(SpanField::Common(CommonField::Resource(
                ResourceField::Attributes
            )))
        );

        let err = SpanKind::parse_field(&PathAst::new(["body"])).unwrap_err();
        assert_eq!(err.to_string(), "unknown path \"body\" in span context");
    }

    #[test]
    fn test_get_and_set_fields() {
        let mut span = span();
        let mut scope = None;
        let mut resource = None;
        let mut ctx = SpanContext::new(&mut span, &mut scope, &mut resource);

        assert_eq!(
            SpanKind::get_field(&ctx, SpanField::SpanIdString).unwrap(),
            Value::from("0102030405060708")
        );
        assert_eq!(
            SpanKind::get_field(&ctx, SpanField::Name).unwrap(),
            Value::from("GET /users")
        );

        SpanKind::set_field(&mut ctx, SpanField::Name, Value::from("renamed")).unwrap();
        SpanKind::set_field(&mut ctx, SpanField::StatusCode, Value::Int(2)).unwrap();
        SpanKind::set_field(
            &mut ctx,
            SpanField::Common(CommonField::Scope(ScopeField::Name)),
            Value::from("my-scope"),
        )
        .unwrap();

        assert_eq!(span.name, "renamed");
        assert_eq!(span.status.as_ref().map(|s| s.code), Some(2));
        assert_eq!(scope.map(|s| s.name), Some("my-scope".to_string()));
    }

    #[test]
    fn test_set_rejects_bad_types() {
        let mut span = span();
        let mut scope = None;
        let mut resource = None;
        let mut ctx = SpanContext::new(&mut span, &mut scope, &mut resource);

        let err = SpanKind::set_field(&mut ctx, SpanField::Name, Value::Int(1)).unwrap_err();
        assert!(err.is_type_mismatch());

        let err = SpanKind::set_field(&mut ctx, SpanField::TraceIdString, Value::from("abcd"))
            .unwrap_err();
        assert!(err.is_type_mismatch());

        let err =
            SpanKind::set_field(&mut ctx, SpanField::StartTimeUnixNano, Value::Int(-5)).unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_for_each_span_visits_all() {
        let mut request = ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![
                    ScopeSpans {
                        spans: vec![span(), span()],
                        ..Default::default()
                    },
                    ScopeSpans {
                        spans: vec![span()],
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
        };

        let mut seen = 0;
        for_each_span(&mut request, |mut ctx| {
            seen += 1;
            ctx.span_mut().name = format!("span-{seen}");
        });

        assert_eq!(seen, 3);
        assert_eq!(request.resource_spans[0].scope_spans[1].spans[0].name, "span-3");
    }
}
