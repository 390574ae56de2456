//! Metric data point context.
//!
//! A data point is addressed by its index inside the parent [`Metric`], not
//! by a reference to the point itself. Functions such as
//! `convert_gauge_to_sum` rebuild the metric's data while a context is live;
//! after that the index is looked up again against the new shape, and an
//! index that no longer exists reads as `PathNotFound`.

use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, number_data_point, ExponentialHistogramDataPoint, HistogramDataPoint, Metric,
    NumberDataPoint, ResourceMetrics, ScopeMetrics, SummaryDataPoint,
};
use opentelemetry_proto::tonic::resource::v1::Resource;

use super::{
    get_common_field, parse_common_field, set_common_field, unknown_path, unsigned, CommonField,
    ContextKind, FieldSpec, TelemetryContext,
};
use crate::ast::PathAst;
use crate::error::{BindError, ExecutionError};
use crate::value::{attributes_to_map, map_to_attributes, Value};

/// Applies the same expression to whichever point shape is present.
macro_rules! with_point {
    ($kind:ident, $point:expr, $p:ident => $body:expr) => {
        match $point {
            $kind::Number($p) => $body,
            $kind::Histogram($p) => $body,
            $kind::ExponentialHistogram($p) => $body,
            $kind::Summary($p) => $body,
        }
    };
}

/// One data point, by index, plus its metric, scope and resource.
pub struct DataPointContext<'a> {
    metric: &'a mut Metric,
    index: usize,
    scope: &'a mut Option<InstrumentationScope>,
    resource: &'a mut Option<Resource>,
}

impl<'a> DataPointContext<'a> {
    pub fn new(
        metric: &'a mut Metric,
        index: usize,
        scope: &'a mut Option<InstrumentationScope>,
        resource: &'a mut Option<Resource>,
    ) -> Self {
        Self {
            metric,
            index,
            scope,
            resource,
        }
    }

    pub fn metric(&self) -> &Metric {
        self.metric
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl TelemetryContext for DataPointContext<'_> {
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

/// Context kinds that can reach the metric owning the current record.
pub trait MetricContext: ContextKind {
    fn metric<'b>(ctx: &'b mut Self::Ctx<'_>) -> &'b mut Metric;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPointField {
    Attributes,
    StartTimeUnixNano,
    TimeUnixNano,
    ValueDouble,
    ValueInt,
    Flags,
    Count,
    Sum,
    BucketCounts,
    ExplicitBounds,
    Scale,
    ZeroCount,
    MetricName,
    MetricDescription,
    MetricUnit,
    MetricType,
    MetricAggregationTemporality,
    MetricIsMonotonic,
    Common(CommonField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPointKind;

impl ContextKind for DataPointKind {
    type Ctx<'a> = DataPointContext<'a>;
    type Field = DataPointField;

    const NAME: &'static str = "datapoint";

    fn parse_field(path: &PathAst) -> Result<FieldSpec<DataPointField>, BindError> {
        use DataPointField as F;

        let name = path.name();
        let spec = match name.as_str() {
            "attributes" => FieldSpec::map(F::Attributes),
            "start_time_unix_nano" => FieldSpec::scalar(F::StartTimeUnixNano),
            "time_unix_nano" => FieldSpec::scalar(F::TimeUnixNano),
            "value_double" => FieldSpec::scalar(F::ValueDouble),
            "value_int" => FieldSpec::scalar(F::ValueInt),
            "flags" => FieldSpec::scalar(F::Flags),
            "count" => FieldSpec::scalar(F::Count),
            "sum" => FieldSpec::scalar(F::Sum),
            "bucket_counts" => FieldSpec::slice(F::BucketCounts),
            "explicit_bounds" => FieldSpec::slice(F::ExplicitBounds),
            "scale" => FieldSpec::scalar(F::Scale),
            "zero_count" => FieldSpec::scalar(F::ZeroCount),
            "metric.name" => FieldSpec::scalar(F::MetricName),
            "metric.description" => FieldSpec::scalar(F::MetricDescription),
            "metric.unit" => FieldSpec::scalar(F::MetricUnit),
            "metric.type" => FieldSpec::scalar(F::MetricType).read_only(),
            "metric.aggregation_temporality" => {
                FieldSpec::scalar(F::MetricAggregationTemporality)
            }
            "metric.is_monotonic" => FieldSpec::scalar(F::MetricIsMonotonic),
            other => parse_common_field(other)
                .map(|spec| spec.map_field(F::Common))
                .ok_or_else(|| unknown_path::<Self>(path))?,
        };
        Ok(spec)
    }

    fn get_field(ctx: &Self::Ctx<'_>, field: DataPointField) -> Result<Value, ExecutionError> {
        use DataPointField as F;

        let metric = &*ctx.metric;
        match field {
            F::MetricName => return Ok(Value::String(metric.name.clone())),
            F::MetricDescription => return Ok(Value::String(metric.description.clone())),
            F::MetricUnit => return Ok(Value::String(metric.unit.clone())),
            F::MetricType => return Ok(Value::from(metric_type(metric))),
            F::MetricAggregationTemporality => {
                let temporality = match &metric.data {
                    Some(Data::Sum(s)) => Some(s.aggregation_temporality),
                    Some(Data::Histogram(h)) => Some(h.aggregation_temporality),
                    Some(Data::ExponentialHistogram(e)) => Some(e.aggregation_temporality),
                    _ => None,
                };
                return Ok(temporality
                    .map(|t| Value::Int(i64::from(t)))
                    .unwrap_or_default());
            }
            F::MetricIsMonotonic => {
                return Ok(match &metric.data {
                    Some(Data::Sum(s)) => Value::Bool(s.is_monotonic),
                    _ => Value::Nil,
                });
            }
            F::Common(f) => return Ok(get_common_field(ctx, f)),
            _ => {}
        }

        let point = point(metric, ctx.index)?;
        let value = match field {
            F::Attributes => {
                with_point!(Point, point, p => Value::Map(attributes_to_map(&p.attributes)))
            }
            F::StartTimeUnixNano => with_point!(Point, point, p => unsigned(p.start_time_unix_nano)),
            F::TimeUnixNano => with_point!(Point, point, p => unsigned(p.time_unix_nano)),
            F::Flags => with_point!(Point, point, p => Value::Int(i64::from(p.flags))),
            F::ValueDouble => match point {
                Point::Number(NumberDataPoint {
                    value: Some(number_data_point::Value::AsDouble(d)),
                    ..
                }) => Value::Double(*d),
                _ => Value::Nil,
            },
            F::ValueInt => match point {
                Point::Number(NumberDataPoint {
                    value: Some(number_data_point::Value::AsInt(i)),
                    ..
                }) => Value::Int(*i),
                _ => Value::Nil,
            },
            F::Count => match point {
                Point::Histogram(p) => unsigned(p.count),
                Point::ExponentialHistogram(p) => unsigned(p.count),
                Point::Summary(p) => unsigned(p.count),
                Point::Number(_) => Value::Nil,
            },
            F::Sum => match point {
                Point::Histogram(p) => p.sum.map(Value::Double).unwrap_or_default(),
                Point::ExponentialHistogram(p) => p.sum.map(Value::Double).unwrap_or_default(),
                Point::Summary(p) => Value::Double(p.sum),
                Point::Number(_) => Value::Nil,
            },
            F::BucketCounts => match point {
                Point::Histogram(p) => {
                    Value::Slice(p.bucket_counts.iter().copied().map(unsigned).collect())
                }
                _ => Value::Nil,
            },
            F::ExplicitBounds => match point {
                Point::Histogram(p) => {
                    Value::Slice(p.explicit_bounds.iter().copied().map(Value::Double).collect())
                }
                _ => Value::Nil,
            },
            F::Scale => match point {
                Point::ExponentialHistogram(p) => Value::Int(i64::from(p.scale)),
                _ => Value::Nil,
            },
            F::ZeroCount => match point {
                Point::ExponentialHistogram(p) => unsigned(p.zero_count),
                _ => Value::Nil,
            },
            _ => Value::Nil,
        };
        Ok(value)
    }

    fn set_field(
        ctx: &mut Self::Ctx<'_>,
        field: DataPointField,
        value: Value,
    ) -> Result<(), ExecutionError> {
        use DataPointField as F;

        match field {
            F::Common(f) => return set_common_field(ctx, f, value),
            F::MetricName => {
                ctx.metric.name = value.into_string()?;
                return Ok(());
            }
            F::MetricDescription => {
                ctx.metric.description = value.into_string()?;
                return Ok(());
            }
            F::MetricUnit => {
                ctx.metric.unit = value.into_string()?;
                return Ok(());
            }
            F::MetricType => {
                return Err(ExecutionError::mismatch("writable field", "read-only metric.type"))
            }
            F::MetricAggregationTemporality => {
                let temporality = value.into_i32()?;
                match &mut ctx.metric.data {
                    Some(Data::Sum(s)) => s.aggregation_temporality = temporality,
                    Some(Data::Histogram(h)) => h.aggregation_temporality = temporality,
                    Some(Data::ExponentialHistogram(e)) => e.aggregation_temporality = temporality,
                    _ => {}
                }
                return Ok(());
            }
            F::MetricIsMonotonic => {
                let monotonic = value.into_bool()?;
                if let Some(Data::Sum(s)) = &mut ctx.metric.data {
                    s.is_monotonic = monotonic;
                }
                return Ok(());
            }
            _ => {}
        }

        let point = point_mut(ctx.metric, ctx.index)?;
        match field {
            F::Attributes => {
                let attributes = map_to_attributes(value.into_map()?);
                with_point!(PointMut, point, p => p.attributes = attributes);
            }
            F::StartTimeUnixNano => {
                let t = value.into_u64()?;
                with_point!(PointMut, point, p => p.start_time_unix_nano = t);
            }
            F::TimeUnixNano => {
                let t = value.into_u64()?;
                with_point!(PointMut, point, p => p.time_unix_nano = t);
            }
            F::Flags => {
                let flags = value.into_u32()?;
                with_point!(PointMut, point, p => p.flags = flags);
            }
            F::ValueDouble => {
                let d = value.into_f64()?;
                if let PointMut::Number(p) = point {
                    p.value = Some(number_data_point::Value::AsDouble(d));
                }
            }
            F::ValueInt => {
                let i = value.into_i64()?;
                if let PointMut::Number(p) = point {
                    p.value = Some(number_data_point::Value::AsInt(i));
                }
            }
            F::Count => {
                let count = value.into_u64()?;
                match point {
                    PointMut::Histogram(p) => p.count = count,
                    PointMut::ExponentialHistogram(p) => p.count = count,
                    PointMut::Summary(p) => p.count = count,
                    PointMut::Number(_) => {}
                }
            }
            F::Sum => {
                let sum = value.into_f64()?;
                match point {
                    PointMut::Histogram(p) => p.sum = Some(sum),
                    PointMut::ExponentialHistogram(p) => p.sum = Some(sum),
                    PointMut::Summary(p) => p.sum = sum,
                    PointMut::Number(_) => {}
                }
            }
            F::BucketCounts => {
                let counts = value
                    .into_slice()?
                    .into_iter()
                    .map(Value::into_u64)
                    .collect::<Result<Vec<_>, _>>()?;
                if let PointMut::Histogram(p) = point {
                    p.bucket_counts = counts;
                }
            }
            F::ExplicitBounds => {
                let bounds = value
                    .into_slice()?
                    .into_iter()
                    .map(Value::into_f64)
                    .collect::<Result<Vec<_>, _>>()?;
                if let PointMut::Histogram(p) = point {
                    p.explicit_bounds = bounds;
                }
            }
            F::Scale => {
                let scale = value.into_i32()?;
                if let PointMut::ExponentialHistogram(p) = point {
                    p.scale = scale;
                }
            }
            F::ZeroCount => {
                let zero_count = value.into_u64()?;
                if let PointMut::ExponentialHistogram(p) = point {
                    p.zero_count = zero_count;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl MetricContext for DataPointKind {
    fn metric<'b>(ctx: &'b mut Self::Ctx<'_>) -> &'b mut Metric {
        &mut *ctx.metric
    }
}

/// Name of the metric's data shape, as exposed by `metric.type`.
pub fn metric_type(metric: &Metric) -> &'static str {
    match &metric.data {
        Some(Data::Gauge(_)) => "Gauge",
        Some(Data::Sum(_)) => "Sum",
        Some(Data::Histogram(_)) => "Histogram",
        Some(Data::ExponentialHistogram(_)) => "ExponentialHistogram",
        Some(Data::Summary(_)) => "Summary",
        None => "Empty",
    }
}

pub fn data_point_count(metric: &Metric) -> usize {
    match &metric.data {
        Some(Data::Gauge(g)) => g.data_points.len(),
        Some(Data::Sum(s)) => s.data_points.len(),
        Some(Data::Histogram(h)) => h.data_points.len(),
        Some(Data::ExponentialHistogram(e)) => e.data_points.len(),
        Some(Data::Summary(s)) => s.data_points.len(),
        None => 0,
    }
}

enum Point<'m> {
    Number(&'m NumberDataPoint),
    Histogram(&'m HistogramDataPoint),
    ExponentialHistogram(&'m ExponentialHistogramDataPoint),
    Summary(&'m SummaryDataPoint),
}

enum PointMut<'m> {
    Number(&'m mut NumberDataPoint),
    Histogram(&'m mut HistogramDataPoint),
    ExponentialHistogram(&'m mut ExponentialHistogramDataPoint),
    Summary(&'m mut SummaryDataPoint),
}

fn missing_point(index: usize) -> ExecutionError {
    ExecutionError::not_found(format!("data point {index}"))
}

fn point(metric: &Metric, index: usize) -> Result<Point<'_>, ExecutionError> {
    let point = match &metric.data {
        Some(Data::Gauge(g)) => g.data_points.get(index).map(Point::Number),
        Some(Data::Sum(s)) => s.data_points.get(index).map(Point::Number),
        Some(Data::Histogram(h)) => h.data_points.get(index).map(Point::Histogram),
        Some(Data::ExponentialHistogram(e)) => {
            e.data_points.get(index).map(Point::ExponentialHistogram)
        }
        Some(Data::Summary(s)) => s.data_points.get(index).map(Point::Summary),
        None => None,
    };
    point.ok_or_else(|| missing_point(index))
}

fn point_mut(metric: &mut Metric, index: usize) -> Result<PointMut<'_>, ExecutionError> {
    let point = match &mut metric.data {
        Some(Data::Gauge(g)) => g.data_points.get_mut(index).map(PointMut::Number),
        Some(Data::Sum(s)) => s.data_points.get_mut(index).map(PointMut::Number),
        Some(Data::Histogram(h)) => h.data_points.get_mut(index).map(PointMut::Histogram),
        Some(Data::ExponentialHistogram(e)) => e
            .data_points
            .get_mut(index)
            .map(PointMut::ExponentialHistogram),
        Some(Data::Summary(s)) => s.data_points.get_mut(index).map(PointMut::Summary),
        None => None,
    };
    point.ok_or_else(|| missing_point(index))
}

/// Visits every data point of every metric in a request.
///
/// The point count is re-read after each callback, so a callback that
/// reshapes the metric never causes an out-of-range visit.
pub fn for_each_data_point<F>(request: &mut ExportMetricsServiceRequest, mut callback: F)
where
    F: FnMut(DataPointContext<'_>),
{
    for resource_metrics in &mut request.resource_metrics {
        let ResourceMetrics {
            resource,
            scope_metrics,
            ..
        } = resource_metrics;
        for scope_metrics in scope_metrics.iter_mut() {
            let ScopeMetrics { scope, metrics, .. } = scope_metrics;
            for metric in metrics.iter_mut() {
                let mut index = 0;
                while index < data_point_count(metric) {
                    callback(DataPointContext::new(metric, index, scope, resource));
                    index += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::metrics::v1::{Gauge, Histogram};

    fn gauge(values: &[f64]) -> Metric {
        Metric {
            name: "cpu.temp".into(),
            data: Some(Data::Gauge(Gauge {
                data_points: values
                    .iter()
                    .map(|v| NumberDataPoint {
                        value: Some(number_data_point::Value::AsDouble(*v)),
                        ..Default::default()
                    })
                    .collect(),
            })),
            ..Default::default()
        }
    }

    fn parse(path: &[&str]) -> FieldSpec<DataPointField> {
        DataPointKind::parse_field(&PathAst::new(path.iter().copied())).unwrap()
    }

    #[test]
    fn test_metric_type_is_read_only() {
        let spec = parse(&["metric", "type"]);
        assert_eq!(spec.field, DataPointField::MetricType);
        assert!(!spec.writable);
        assert!(parse(&["metric", "name"]).writable);
    }

    #[test]
    fn test_number_point_values() {
        let mut metric = gauge(&[1.5]);
        let mut scope = None;
        let mut resource = None;
        let mut ctx = DataPointContext::new(&mut metric, 0, &mut scope, &mut resource);

        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::ValueDouble).unwrap(),
            Value::Double(1.5)
        );
        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::ValueInt).unwrap(),
            Value::Nil
        );
        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::MetricType).unwrap(),
            Value::from("Gauge")
        );

        DataPointKind::set_field(&mut ctx, DataPointField::ValueInt, Value::Int(7)).unwrap();
        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::ValueInt).unwrap(),
            Value::Int(7)
        );

        // no histogram fields on a number point
        DataPointKind::set_field(&mut ctx, DataPointField::Count, Value::Int(3)).unwrap();
        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::Count).unwrap(),
            Value::Nil
        );
    }

    #[test]
    fn test_histogram_fields() {
        let mut metric = Metric {
            data: Some(Data::Histogram(Histogram {
                data_points: vec![HistogramDataPoint {
                    count: 4,
                    sum: Some(10.0),
                    bucket_counts: vec![1, 3],
                    explicit_bounds: vec![5.0],
                    ..Default::default()
                }],
                aggregation_temporality: 2,
            })),
            ..Default::default()
        };
        let mut scope = None;
        let mut resource = None;
        let mut ctx = DataPointContext::new(&mut metric, 0, &mut scope, &mut resource);

        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::BucketCounts).unwrap(),
            Value::Slice(vec![Value::Int(1), Value::Int(3)])
        );
        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::MetricAggregationTemporality).unwrap(),
            Value::Int(2)
        );

        DataPointKind::set_field(&mut ctx, DataPointField::Sum, Value::Int(12)).unwrap();
        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::Sum).unwrap(),
            Value::Double(12.0)
        );

        let err = DataPointKind::set_field(
            &mut ctx,
            DataPointField::BucketCounts,
            Value::Slice(vec![Value::Int(-1)]),
        )
        .unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_stale_index_is_path_not_found() {
        let mut metric = gauge(&[1.0]);
        let mut scope = None;
        let mut resource = None;
        let ctx = DataPointContext::new(&mut metric, 3, &mut scope, &mut resource);

        let err = DataPointKind::get_field(&ctx, DataPointField::TimeUnixNano).unwrap_err();
        assert!(err.is_path_not_found());
        // metric-level fields do not need the point
        assert_eq!(
            DataPointKind::get_field(&ctx, DataPointField::MetricName).unwrap(),
            Value::from("cpu.temp")
        );
    }

    #[test]
    fn test_for_each_data_point_visits_every_point() {
        let mut request = ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![gauge(&[1.0, 2.0]), gauge(&[3.0])],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let mut seen = Vec::new();
        for_each_data_point(&mut request, |ctx| {
            seen.push(DataPointKind::get_field(&ctx, DataPointField::ValueDouble).unwrap());
        });
        assert_eq!(
            seen,
            vec![Value::Double(1.0), Value::Double(2.0), Value::Double(3.0)]
        );
    }
}
