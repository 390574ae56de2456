//! Pipeline-stage facade over the statement evaluator.
//!
//! A [`Processor`] binds every configured statement group once and then runs
//! them over OTLP export requests, in the order the groups were declared.

use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::resource::v1::Resource;
use tracing::{info, warn};

use crate::config::{Config, ContextName, ContextStatements, ErrorMode};
use crate::contexts::{
    for_each_data_point, for_each_log_record, for_each_resource, for_each_span, ContextKind,
    DataPointKind, LogKind, ResourceKind, SpanKind,
};
use crate::error::{Error, Result};
use crate::transform::{
    BatchReport, RecordError, Registry, Statements, DATAPOINT_FUNCTIONS, LOG_FUNCTIONS,
    RESOURCE_FUNCTIONS, SPAN_FUNCTIONS,
};

/// One bound statement group: either the signal's resources or its records.
#[derive(Debug)]
enum Group<K: ContextKind> {
    Resource(Statements<ResourceKind>),
    Record(Statements<K>),
}

#[derive(Debug)]
pub struct Processor {
    error_mode: ErrorMode,
    traces: Vec<Group<SpanKind>>,
    logs: Vec<Group<LogKind>>,
    metrics: Vec<Group<DataPointKind>>,
    shut_down: AtomicBool,
}

impl Processor {
    /// Validates the config and binds every statement against the default
    /// registries. Any bind error fails construction.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let processor = Self {
            error_mode: config.error_mode,
            traces: bind_groups(&config.trace_statements, ContextName::Span, &*SPAN_FUNCTIONS)?,
            logs: bind_groups(&config.log_statements, ContextName::Log, &*LOG_FUNCTIONS)?,
            metrics: bind_groups(
                &config.metric_statements,
                ContextName::Datapoint,
                &*DATAPOINT_FUNCTIONS,
            )?,
            shut_down: AtomicBool::new(false),
        };

        info!(
            error_mode = %processor.error_mode,
            trace_groups = processor.traces.len(),
            log_groups = processor.logs.len(),
            metric_groups = processor.metrics.len(),
            "transform processor ready"
        );
        Ok(processor)
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    /// Refuses every batch that starts after this call. A batch already
    /// running finishes all of its records.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            info!("transform processor shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn process_traces(&self, request: &mut ExportTraceServiceRequest) -> Result<BatchReport> {
        self.ensure_running()?;

        let mut records = 0;
        for_each_span(request, |_| records += 1);
        let resources = request.resource_spans.len();

        let mut errors = Vec::new();
        for group in &self.traces {
            match group {
                Group::Resource(statements) => errors.extend(run_resources(
                    statements,
                    request.resource_spans.iter_mut().map(|r| &mut r.resource),
                )),
                Group::Record(statements) => {
                    let mut index = 0;
                    for_each_span(request, |mut ctx| {
                        errors.extend(statements.execute(index, &mut ctx));
                        index += 1;
                    });
                }
            }
        }
        self.finish("traces", BatchReport::from_errors(records, resources, errors))
    }

    pub fn process_logs(&self, request: &mut ExportLogsServiceRequest) -> Result<BatchReport> {
        self.ensure_running()?;

        let mut records = 0;
        for_each_log_record(request, |_| records += 1);
        let resources = request.resource_logs.len();

        let mut errors = Vec::new();
        for group in &self.logs {
            match group {
                Group::Resource(statements) => errors.extend(run_resources(
                    statements,
                    request.resource_logs.iter_mut().map(|r| &mut r.resource),
                )),
                Group::Record(statements) => {
                    let mut index = 0;
                    for_each_log_record(request, |mut ctx| {
                        errors.extend(statements.execute(index, &mut ctx));
                        index += 1;
                    });
                }
            }
        }
        self.finish("logs", BatchReport::from_errors(records, resources, errors))
    }

    /// Records are the data points present when the batch starts; conversions
    /// between gauge and sum keep that count.
    pub fn process_metrics(
        &self,
        request: &mut ExportMetricsServiceRequest,
    ) -> Result<BatchReport> {
        self.ensure_running()?;

        let mut records = 0;
        for_each_data_point(request, |_| records += 1);
        let resources = request.resource_metrics.len();

        let mut errors = Vec::new();
        for group in &self.metrics {
            match group {
                Group::Resource(statements) => errors.extend(run_resources(
                    statements,
                    request.resource_metrics.iter_mut().map(|r| &mut r.resource),
                )),
                Group::Record(statements) => {
                    let mut index = 0;
                    for_each_data_point(request, |mut ctx| {
                        errors.extend(statements.execute(index, &mut ctx));
                        index += 1;
                    });
                }
            }
        }
        self.finish("metrics", BatchReport::from_errors(records, resources, errors))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    /// Applies the error mode to a finished batch.
    fn finish(&self, signal: &'static str, report: BatchReport) -> Result<BatchReport> {
        if !report.is_partial_failure() {
            return Ok(report);
        }
        match self.error_mode {
            ErrorMode::Ignore => {
                for failure in &report.errors {
                    warn!(
                        signal,
                        context = failure.context,
                        record = failure.record,
                        statement = failure.statement,
                        error = %failure.error,
                        "failed to execute statement"
                    );
                }
                Ok(report)
            }
            ErrorMode::Propagate => Err(Error::PartialFailure(report)),
            ErrorMode::Silent => Ok(report),
        }
    }
}

fn bind_groups<K: ContextKind>(
    groups: &[ContextStatements],
    record: ContextName,
    registry: &Registry<K>,
) -> Result<Vec<Group<K>>> {
    groups
        .iter()
        .map(|group| match group.context {
            ContextName::Resource => Ok(Group::Resource(Statements::bind(
                &*RESOURCE_FUNCTIONS,
                &group.statements,
            )?)),
            context if context == record => {
                Ok(Group::Record(Statements::bind(registry, &group.statements)?))
            }
            context => Err(Error::Config(format!(
                "context \"{context}\" cannot run alongside {record} statements"
            ))),
        })
        .collect()
}

fn run_resources<'r>(
    statements: &Statements<ResourceKind>,
    resources: impl IntoIterator<Item = &'r mut Option<Resource>>,
) -> Vec<RecordError> {
    let mut errors = Vec::new();
    let mut index = 0;
    for_each_resource(resources, |mut ctx| {
        errors.extend(statements.execute(index, &mut ctx));
        index += 1;
    });
    errors
}
