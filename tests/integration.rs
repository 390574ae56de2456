//! Integration tests for otlp-transform
//!
//! These tests drive whole OTLP requests through a configured processor,
//! including the byte-level codec.

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, ArrayValue, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, number_data_point, AggregationTemporality, Gauge, Histogram,
    HistogramDataPoint, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use pretty_assertions::assert_eq;

use otlp_transform::{
    decode_metrics, encode_logs, encode_metrics, transform_logs, transform_metrics, ArgumentAst,
    BindError, CompareOp, ConditionAst, Config, ContextName, ContextStatements, Error, ErrorMode,
    InputFormat, PathAst, Processor, StatementAst,
};

// ============================================================================
// Fixtures
// ============================================================================

fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.into(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.into())),
        }),
    }
}

fn path(fields: &[&str]) -> ArgumentAst {
    ArgumentAst::path(PathAst::new(fields.iter().copied()))
}

fn number_point(time: u64, value: f64) -> NumberDataPoint {
    NumberDataPoint {
        time_unix_nano: time,
        attributes: vec![string_attr("cpu", &format!("cpu{time}"))],
        value: Some(number_data_point::Value::AsDouble(value)),
        ..Default::default()
    }
}

fn gauge(name: &str, points: usize) -> Metric {
    Metric {
        name: name.into(),
        unit: "1".into(),
        data: Some(Data::Gauge(Gauge {
            data_points: (0..points)
                .map(|i| number_point(i as u64, i as f64 * 1.5))
                .collect(),
        })),
        ..Default::default()
    }
}

fn metrics_request(metrics: Vec<Metric>) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(Resource {
                attributes: vec![string_attr("service.name", "billing")],
                ..Default::default()
            }),
            scope_metrics: vec![ScopeMetrics {
                metrics,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn logs_request(records: usize) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: Some(Resource {
                attributes: vec![string_attr("service.name", "checkout")],
                ..Default::default()
            }),
            scope_logs: vec![ScopeLogs {
                log_records: (0..records)
                    .map(|i| LogRecord {
                        severity_text: "INFO".into(),
                        body: Some(AnyValue {
                            value: Some(any_value::Value::StringValue(format!("message {i}"))),
                        }),
                        attributes: vec![
                            string_attr("user.email", "someone@example.com"),
                            string_attr("request.id", &format!("req-{i}")),
                        ],
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn traces_request() -> ExportTraceServiceRequest {
    let tags = KeyValue {
        key: "tags".into(),
        value: Some(AnyValue {
            value: Some(any_value::Value::ArrayValue(ArrayValue {
                values: vec![AnyValue {
                    value: Some(any_value::Value::StringValue("a".into())),
                }],
            })),
        }),
    };
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans: vec![Span {
                    name: "GET /cart".into(),
                    trace_id: vec![7; 16],
                    span_id: vec![3; 8],
                    attributes: vec![string_attr("http.method", "GET"), tags],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn convert_gauges(temporality: &str, monotonic: bool) -> Config {
    Config {
        metric_statements: vec![ContextStatements::new(
            ContextName::Datapoint,
            vec![StatementAst::new(
                "convert_gauge_to_sum",
                vec![temporality.into(), ArgumentAst::Bool(monotonic)],
            )],
        )],
        ..Default::default()
    }
}

fn scrub_logs() -> Config {
    Config {
        log_statements: vec![ContextStatements::new(
            ContextName::Log,
            vec![StatementAst::new(
                "delete_key",
                vec![path(&["attributes"]), "user.email".into()],
            )],
        )],
        ..Default::default()
    }
}

fn first_metric(request: &ExportMetricsServiceRequest) -> &Metric {
    &request.resource_metrics[0].scope_metrics[0].metrics[0]
}

// ============================================================================
// Metric conversion
// ============================================================================

#[test]
fn test_convert_gauge_to_sum_keeps_points_in_order() {
    let processor = Processor::new(convert_gauges("cumulative", true)).unwrap();
    let original = gauge("cpu.utilization", 4);
    let Some(Data::Gauge(original_gauge)) = original.data.clone() else {
        unreachable!()
    };

    let bytes = encode_metrics(&metrics_request(vec![original]), InputFormat::Protobuf).unwrap();
    let out = transform_metrics(&processor, &bytes, InputFormat::Protobuf).unwrap();
    assert_eq!(out.report.failed_records, 0);

    let request = decode_metrics(&out.payload, InputFormat::Protobuf).unwrap();
    let metric = first_metric(&request);
    assert_eq!(metric.name, "cpu.utilization");
    let Some(Data::Sum(sum)) = &metric.data else {
        panic!("expected a sum, got {:?}", metric.data);
    };
    assert!(sum.is_monotonic);
    assert_eq!(
        sum.aggregation_temporality,
        AggregationTemporality::Cumulative as i32
    );
    assert_eq!(sum.data_points, original_gauge.data_points);
}

#[test]
fn test_convert_gauge_to_sum_skips_other_metrics() {
    let processor = Processor::new(convert_gauges("delta", false)).unwrap();
    let sum = Metric {
        name: "requests".into(),
        data: Some(Data::Sum(Sum {
            data_points: vec![number_point(1, 10.0), number_point(2, 20.0)],
            aggregation_temporality: AggregationTemporality::Cumulative as i32,
            is_monotonic: true,
        })),
        ..Default::default()
    };
    let histogram = Metric {
        name: "latency".into(),
        data: Some(Data::Histogram(Histogram {
            data_points: vec![HistogramDataPoint {
                count: 3,
                bucket_counts: vec![1, 2],
                explicit_bounds: vec![10.0],
                ..Default::default()
            }],
            aggregation_temporality: AggregationTemporality::Delta as i32,
        })),
        ..Default::default()
    };

    let mut request = metrics_request(vec![sum, histogram]);
    let before = request.clone();
    let report = processor.process_metrics(&mut request).unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(report.failed_records, 0);
    assert_eq!(request, before);
}

#[test]
fn test_unknown_temporality_fails_to_bind() {
    let err = Processor::new(convert_gauges("sideways", true)).unwrap_err();
    let Error::Bind(bind) = err else {
        panic!("expected a bind error, got {err:?}");
    };
    assert_eq!(
        bind.root(),
        &BindError::InvalidArgument {
            function: "convert_gauge_to_sum".into(),
            keyword: "aggregation_temporality".into(),
            reason: "unknown aggregation temporality: sideways".into(),
        }
    );
}

#[test]
fn test_guarded_conversion_by_metric_name() {
    let config = Config {
        metric_statements: vec![ContextStatements::new(
            ContextName::Datapoint,
            vec![StatementAst::new(
                "convert_gauge_to_sum",
                vec!["delta".into(), ArgumentAst::Bool(false)],
            )
            .with_condition(ConditionAst::compare(
                path(&["metric", "name"]),
                CompareOp::Eq,
                "queue.depth",
            ))],
        )],
        ..Default::default()
    };
    let processor = Processor::new(config).unwrap();

    let mut request = metrics_request(vec![gauge("queue.depth", 2), gauge("cpu.temp", 2)]);
    processor.process_metrics(&mut request).unwrap();

    let metrics = &request.resource_metrics[0].scope_metrics[0].metrics;
    assert!(matches!(metrics[0].data, Some(Data::Sum(_))));
    assert!(matches!(metrics[1].data, Some(Data::Gauge(_))));
}

// ============================================================================
// Key deletion
// ============================================================================

#[test]
fn test_delete_key_removes_exactly_one_key() {
    let processor = Processor::new(scrub_logs()).unwrap();
    let mut request = logs_request(2);
    let report = processor.process_logs(&mut request).unwrap();

    assert_eq!(report.records, 2);
    for record in &request.resource_logs[0].scope_logs[0].log_records {
        let keys: Vec<_> = record.attributes.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["request.id"]);
    }
}

#[test]
fn test_delete_key_on_non_map_and_missing_path() {
    let config = Config {
        error_mode: ErrorMode::Silent,
        trace_statements: vec![ContextStatements::new(
            ContextName::Span,
            vec![
                // a string target is left alone
                StatementAst::new("delete_key", vec![path(&["name"]), "GET".into()]),
                // index 5 of a one-element list does not resolve
                StatementAst::new(
                    "delete_key",
                    vec![
                        ArgumentAst::path(PathAst::new(["attributes"]).key("tags").key(5i64)),
                        "x".into(),
                    ],
                ),
            ],
        )],
        ..Default::default()
    };
    let processor = Processor::new(config).unwrap();

    let mut request = traces_request();
    let report = processor.process_traces(&mut request).unwrap();

    assert_eq!(report.failed_records, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].statement, 1);
    assert!(report.errors[0].error.is_path_not_found());
    assert_eq!(
        request.resource_spans[0].scope_spans[0].spans[0].name,
        "GET /cart"
    );
}

// ============================================================================
// Partial failure
// ============================================================================

#[test]
fn test_one_failing_record_out_of_many() {
    // Only record 3 carries a body that cannot become a severity number.
    let config = Config {
        log_statements: vec![ContextStatements::new(
            ContextName::Log,
            vec![
                StatementAst::new("set", vec![path(&["severity_number"]), path(&["body"])])
                    .with_condition(ConditionAst::compare(
                        path(&["body"]),
                        CompareOp::Eq,
                        "message 3",
                    )),
                StatementAst::new("set", vec![path(&["severity_text"]), "WARN".into()]),
            ],
        )],
        ..Default::default()
    };
    let processor = Processor::new(config).unwrap();

    let mut request = logs_request(6);
    let report = processor.process_logs(&mut request).unwrap();

    assert_eq!(report.records, 6);
    assert_eq!(report.failed_records, 1);
    assert_eq!(report.errors[0].record, 3);
    assert_eq!(report.errors[0].context, "log");
    assert!(report.errors[0].error.is_type_mismatch());
    assert!(request.resource_logs[0].scope_logs[0]
        .log_records
        .iter()
        .all(|r| r.severity_text == "WARN"));
}

#[test]
fn test_propagate_keeps_mutations() {
    let mut config = scrub_logs().with_error_mode(ErrorMode::Propagate);
    config.log_statements[0].statements.push(StatementAst::new(
        "set",
        vec![path(&["flags"]), ArgumentAst::Int(-1)],
    ));
    let processor = Processor::new(config).unwrap();

    let mut request = logs_request(2);
    let Err(Error::PartialFailure(report)) = processor.process_logs(&mut request) else {
        panic!("expected a partial failure");
    };
    assert_eq!((report.records, report.failed_records), (2, 2));
    assert!(request.resource_logs[0].scope_logs[0]
        .log_records
        .iter()
        .all(|r| r.attributes.len() == 1));
}

// ============================================================================
// Determinism and concurrency
// ============================================================================

#[test]
fn test_rerunning_converged_statements_is_idempotent() {
    let config = Config {
        log_statements: vec![ContextStatements::new(
            ContextName::Log,
            vec![
                StatementAst::new("delete_key", vec![path(&["attributes"]), "user.email".into()]),
                StatementAst::new(
                    "set",
                    vec![
                        ArgumentAst::path(PathAst::new(["attributes"]).key("service")),
                        ArgumentAst::path(
                            PathAst::new(["resource", "attributes"]).key("service.name"),
                        ),
                    ],
                ),
                StatementAst::new(
                    "keep_keys",
                    vec![path(&["attributes"]), ArgumentAst::List(vec!["service".into()])],
                ),
            ],
        )],
        ..Default::default()
    };
    let processor = Processor::new(config).unwrap();

    let mut request = logs_request(3);
    processor.process_logs(&mut request).unwrap();
    let once = request.clone();
    processor.process_logs(&mut request).unwrap();

    assert_eq!(request, once);
    let record = &request.resource_logs[0].scope_logs[0].log_records[0];
    assert_eq!(record.attributes, vec![string_attr("service", "checkout")]);
}

#[test]
fn test_binding_is_deterministic() {
    let config = convert_gauges("delta", true);
    let first = Processor::new(config.clone()).unwrap();
    let second = Processor::new(config).unwrap();

    let mut a = metrics_request(vec![gauge("a", 3)]);
    let mut b = a.clone();
    first.process_metrics(&mut a).unwrap();
    second.process_metrics(&mut b).unwrap();

    assert_eq!(a, b);
}

#[test]
fn test_processor_is_shared_across_threads() {
    let processor = Processor::new(scrub_logs()).unwrap();

    let reports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=4)
            .map(|records| {
                let processor = &processor;
                scope.spawn(move || {
                    let mut request = logs_request(records);
                    let report = processor.process_logs(&mut request).unwrap();
                    let clean = request.resource_logs[0].scope_logs[0]
                        .log_records
                        .iter()
                        .all(|r| r.attributes.len() == 1);
                    (report.records, clean)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(reports, vec![(1, true), (2, true), (3, true), (4, true)]);
}

// ============================================================================
// Codec and config
// ============================================================================

#[test]
fn test_json_logs_round_trip_through_processor() {
    let processor = Processor::new(scrub_logs()).unwrap();
    let bytes = encode_logs(&logs_request(1), InputFormat::Json).unwrap();

    let out = transform_logs(&processor, &bytes, InputFormat::Auto).unwrap();
    assert_eq!(out.report.records, 1);

    // Auto input comes back as protobuf
    let request = otlp_transform::decode_logs(&out.payload, InputFormat::Protobuf).unwrap();
    let record = &request.resource_logs[0].scope_logs[0].log_records[0];
    assert_eq!(record.attributes, vec![string_attr("request.id", "req-0")]);
}

#[test]
fn test_processor_from_json_config() {
    let config = Config::from_json(
        r#"{
            "error_mode": "propagate",
            "metric_statements": [
                {"context": "resource", "statements": [
                    {"function": "set", "arguments": [
                        {"path": {"fields": ["attributes"], "keys": ["deployment.environment"]}},
                        {"string": "prod"}
                    ]}
                ]},
                {"context": "datapoint", "statements": [
                    {"function": "convert_gauge_to_sum",
                     "arguments": [{"string": "cumulative"}, {"bool": false}],
                     "where": {"compare": {
                        "left": {"path": {"fields": ["metric", "unit"]}},
                        "op": "eq",
                        "right": {"string": "1"}
                     }}}
                ]}
            ]
        }"#,
    )
    .unwrap();
    let processor = Processor::new(config).unwrap();
    assert_eq!(processor.error_mode(), ErrorMode::Propagate);

    let mut request = metrics_request(vec![gauge("cpu", 2)]);
    let report = processor.process_metrics(&mut request).unwrap();

    assert_eq!((report.records, report.resources), (2, 1));
    let resource = request.resource_metrics[0].resource.as_ref().unwrap();
    assert_eq!(
        resource.attributes[1],
        string_attr("deployment.environment", "prod")
    );
    assert!(matches!(
        first_metric(&request).data,
        Some(Data::Sum(Sum { is_monotonic: false, .. }))
    ));
}

#[test]
fn test_shutdown_refuses_new_batches() {
    let processor = Processor::new(scrub_logs()).unwrap();
    let bytes = encode_logs(&logs_request(1), InputFormat::Protobuf).unwrap();
    assert!(transform_logs(&processor, &bytes, InputFormat::Protobuf).is_ok());

    processor.shutdown();
    let err = transform_logs(&processor, &bytes, InputFormat::Protobuf).unwrap_err();
    assert!(matches!(err, Error::Shutdown));
}
