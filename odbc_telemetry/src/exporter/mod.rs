//! Exporter facades handed to the instrumentation host.

pub mod batch_writer;

pub use batch_writer::BatchWriter;

use crate::config::ExporterOptions;
use crate::error::{ExportError, Result};
use crate::mapping::{LogMapper, MetricMapper, RecordMapper, TraceMapper};
use crate::observability::{ExportMetrics, StructuredLogger};
use crate::schema::Table;
use crate::sink::{OdbcSink, Sink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome reported back to the producer for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportResult {
    Success,
    Failure,
}

impl ExportResult {
    pub fn is_success(self) -> bool {
        self == ExportResult::Success
    }
}

/// Uniform surface of the three exporters.
pub trait TelemetryExporter: Send + Sync {
    type Record;

    fn export(&self, batch: &[Self::Record]) -> ExportResult;

    /// Nothing is buffered between calls, so there is nothing to flush.
    fn force_flush(&self) -> ExportResult {
        ExportResult::Success
    }

    fn shutdown(&self) -> ExportResult {
        ExportResult::Success
    }

    fn name(&self) -> &'static str {
        "TelemetryExporter"
    }
}

/// Exporter for one record kind. Cheap to clone; clones share the sink and
/// the counters.
pub struct Exporter<M: RecordMapper> {
    writer: Arc<BatchWriter<M>>,
    options: Arc<ExporterOptions>,
}

pub type TraceExporter = Exporter<TraceMapper>;
pub type MetricExporter = Exporter<MetricMapper>;
pub type LogExporter = Exporter<LogMapper>;

impl<M: RecordMapper> Clone for Exporter<M> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            options: Arc::clone(&self.options),
        }
    }
}

impl<M: RecordMapper> Exporter<M> {
    /// Validates the options and prepares an ODBC sink. No connection is
    /// opened until the first export.
    pub fn new(options: ExporterOptions) -> Result<Self> {
        options.validate()?;
        let sink = OdbcSink::from_options(&options)?;
        Self::with_sink(options, Arc::new(sink))
    }

    pub fn with_sink(options: ExporterOptions, sink: Arc<dyn Sink>) -> Result<Self> {
        options.validate()?;
        let options = Arc::new(options);
        let writer = BatchWriter::new(sink, Arc::clone(&options))?;
        Ok(Self {
            writer: Arc::new(writer),
            options,
        })
    }

    pub fn with_logger(self, logger: StructuredLogger) -> Self {
        let writer = (*self.writer).clone().with_logger(logger);
        Self {
            writer: Arc::new(writer),
            options: self.options,
        }
    }

    pub fn options(&self) -> &ExporterOptions {
        &self.options
    }

    pub fn metrics(&self) -> &ExportMetrics {
        self.writer.metrics()
    }

    pub fn export(&self, batch: &[M::Record]) -> ExportResult {
        self.writer.write(batch)
    }

    /// Runs the write on the blocking pool, bounded by `export_timeout_ms`.
    ///
    /// At the deadline the write is cancelled before its next statement and
    /// the open transaction is rolled back; the returned result is always the
    /// write's own outcome, so a commit already under way is reported as
    /// such. Dropping the future also cancels the write.
    pub async fn export_async(&self, batch: Vec<M::Record>) -> ExportResult {
        if batch.is_empty() {
            return ExportResult::Success;
        }

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let writer = Arc::clone(&self.writer);
        let task_cancel = cancel.clone();
        let mut handle =
            tokio::task::spawn_blocking(move || writer.write_with_cancel(&batch, &task_cancel));

        let joined = match tokio::time::timeout(self.options.export_timeout(), &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                log::warn!(
                    "{} export exceeded {}ms, cancelling",
                    M::KIND,
                    self.options.export_timeout_ms
                );
                handle.await
            }
        };

        match joined {
            Ok(result) => result,
            Err(join_error) => {
                self.writer.metrics().record_failure();
                self.writer.logger().log_export_failure(
                    M::KIND,
                    &ExportError::Internal(format!("Export task failed: {}", join_error)),
                );
                ExportResult::Failure
            }
        }
    }

    pub fn force_flush(&self) -> ExportResult {
        ExportResult::Success
    }

    /// Releases nothing: connections never outlive an export call.
    pub fn shutdown(&self) -> ExportResult {
        self.writer
            .logger()
            .log_lifecycle(log::Level::Debug, exporter_name(M::TABLE), "shut down");
        ExportResult::Success
    }
}

impl<M: RecordMapper> TelemetryExporter for Exporter<M> {
    type Record = M::Record;

    fn export(&self, batch: &[M::Record]) -> ExportResult {
        Exporter::export(self, batch)
    }

    fn force_flush(&self) -> ExportResult {
        Exporter::force_flush(self)
    }

    fn shutdown(&self) -> ExportResult {
        Exporter::shutdown(self)
    }

    fn name(&self) -> &'static str {
        exporter_name(M::TABLE)
    }
}

fn exporter_name(table: Table) -> &'static str {
    match table {
        Table::Traces => "TraceExporter",
        Table::Metrics => "MetricExporter",
        Table::Logs => "LogExporter",
    }
}
