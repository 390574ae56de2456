//! JSON normalization for OTLP JSON payloads.
//!
//! OTLP JSON allows enum fields to be written by name (`"SPAN_KIND_SERVER"`)
//! or as numeric strings. The generated message types only accept numbers,
//! so known enum fields are rewritten before deserializing.

use opentelemetry_proto::tonic::logs::v1::SeverityNumber;
use opentelemetry_proto::tonic::metrics::v1::AggregationTemporality;
use opentelemetry_proto::tonic::trace::v1::{span::SpanKind, status::StatusCode};
use serde_json::Value as JsonValue;

use super::DecodeError;

/// Normalize OTLP JSON bytes so every enum field is numeric.
pub fn normalize_json_bytes(body: &[u8]) -> Result<JsonValue, DecodeError> {
    let mut value: JsonValue = serde_json::from_slice(body)?;
    normalize_json_value(&mut value, None);
    Ok(value)
}

/// Recursively rewrites enum strings under known keys.
pub fn normalize_json_value(value: &mut JsonValue, key_hint: Option<&str>) {
    match value {
        JsonValue::Object(map) => {
            for (key, val) in map.iter_mut() {
                normalize_json_value(val, Some(key.as_str()));
            }
        }
        JsonValue::Array(values) => {
            for item in values.iter_mut() {
                normalize_json_value(item, key_hint);
            }
        }
        JsonValue::String(current) => {
            if let Some(converted) = key_hint.and_then(|key| enum_value(key, current)) {
                *value = JsonValue::Number(converted.into());
            }
        }
        _ => {}
    }
}

fn enum_value(key: &str, value: &str) -> Option<i32> {
    let named = match key {
        "kind" => SpanKind::from_str_name(value).map(|v| v as i32),
        "code" => StatusCode::from_str_name(value).map(|v| v as i32),
        "severityNumber" | "severity_number" => {
            SeverityNumber::from_str_name(value).map(|v| v as i32)
        }
        "aggregationTemporality" | "aggregation_temporality" => {
            AggregationTemporality::from_str_name(value).map(|v| v as i32)
        }
        _ => return None,
    };
    named.or_else(|| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalized(mut value: JsonValue) -> JsonValue {
        normalize_json_value(&mut value, None);
        value
    }

    #[test]
    fn test_enum_names_become_numbers() {
        let value = normalized(json!({
            "kind": "SPAN_KIND_SERVER",
            "status": {"code": "STATUS_CODE_ERROR"},
            "severityNumber": "SEVERITY_NUMBER_WARN",
            "aggregationTemporality": "AGGREGATION_TEMPORALITY_CUMULATIVE",
        }));
        assert_eq!(
            value,
            json!({
                "kind": 2,
                "status": {"code": 2},
                "severityNumber": 13,
                "aggregationTemporality": 2,
            })
        );
    }

    #[test]
    fn test_numeric_strings_and_other_keys() {
        let value = normalized(json!({
            "severityNumber": "9",
            "name": "SPAN_KIND_SERVER",
            "kind": "not-a-kind",
        }));
        assert_eq!(
            value,
            json!({"severityNumber": 9, "name": "SPAN_KIND_SERVER", "kind": "not-a-kind"})
        );
    }

    #[test]
    fn test_nested_arrays_keep_key_hint() {
        let value = normalized(json!({"spans": [{"kind": "SPAN_KIND_CLIENT"}]}));
        assert_eq!(value, json!({"spans": [{"kind": 3}]}));
    }
}
