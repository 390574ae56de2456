//! Functions that change the data shape of the metric owning a data point.
//!
//! Retagging a metric discards the old variant, so the points are moved out
//! first and moved into the new variant afterwards. Every point of a metric
//! runs the same statement; once the first one has converted the metric, the
//! rest see the new shape and skip.

use opentelemetry_proto::tonic::metrics::v1::{metric::Data, AggregationTemporality, Gauge, Sum};

use crate::contexts::datapoint::MetricContext;
use crate::error::{BindError, ExecutionError};
use crate::transform::getter::ExprFunc;
use crate::value::Value;

use super::{ArgumentList, Function, Parameter, ParameterKind};

fn parse_temporality(literal: &str) -> Result<AggregationTemporality, BindError> {
    match literal {
        "delta" => Ok(AggregationTemporality::Delta),
        "cumulative" => Ok(AggregationTemporality::Cumulative),
        other => Err(BindError::invalid_argument(
            "convert_gauge_to_sum",
            "aggregation_temporality",
            format!("unknown aggregation temporality: {other}"),
        )),
    }
}

// --- convert_gauge_to_sum ---
/// Turn a Gauge into a Sum with the given temporality and monotonicity
#[derive(Clone, Copy, Debug)]
pub struct ConvertGaugeToSum;

impl<K: MetricContext> Function<K> for ConvertGaugeToSum {
    fn identifier(&self) -> &'static str {
        "convert_gauge_to_sum"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[
            Parameter {
                keyword: "aggregation_temporality",
                kind: ParameterKind::String,
                required: true,
            },
            Parameter {
                keyword: "is_monotonic",
                kind: ParameterKind::Bool,
                required: true,
            },
        ]
    }

    fn compile(&self, mut arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let temporality =
            parse_temporality(&arguments.required_string("aggregation_temporality")?)?;
        let monotonic = arguments.required_bool("is_monotonic")?;
        Ok(Box::new(ConvertGaugeToSumFn {
            temporality: temporality as i32,
            monotonic,
        }))
    }
}

#[derive(Debug)]
struct ConvertGaugeToSumFn {
    temporality: i32,
    monotonic: bool,
}

impl<K: MetricContext> ExprFunc<K> for ConvertGaugeToSumFn {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        let metric = K::metric(ctx);
        let Some(Data::Gauge(gauge)) = &mut metric.data else {
            return Ok(None);
        };

        let data_points = std::mem::take(&mut gauge.data_points);
        metric.data = Some(Data::Sum(Sum {
            data_points,
            aggregation_temporality: self.temporality,
            is_monotonic: self.monotonic,
        }));
        Ok(None)
    }
}

// --- convert_sum_to_gauge ---
/// Turn a Sum into a Gauge, dropping temporality and monotonicity
#[derive(Clone, Copy, Debug)]
pub struct ConvertSumToGauge;

impl<K: MetricContext> Function<K> for ConvertSumToGauge {
    fn identifier(&self) -> &'static str {
        "convert_sum_to_gauge"
    }

    fn parameters(&self) -> &'static [Parameter] {
        &[]
    }

    fn compile(&self, _arguments: ArgumentList<K>) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        Ok(Box::new(ConvertSumToGaugeFn))
    }
}

#[derive(Debug)]
struct ConvertSumToGaugeFn;

impl<K: MetricContext> ExprFunc<K> for ConvertSumToGaugeFn {
    fn invoke(&self, ctx: &mut K::Ctx<'_>) -> Result<Option<Value>, ExecutionError> {
        let metric = K::metric(ctx);
        let Some(Data::Sum(sum)) = &mut metric.data else {
            return Ok(None);
        };

        let data_points = std::mem::take(&mut sum.data_points);
        metric.data = Some(Data::Gauge(Gauge { data_points }));
        Ok(None)
    }
}
