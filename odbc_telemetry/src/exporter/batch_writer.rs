use super::ExportResult;
use crate::config::ExporterOptions;
use crate::error::{ExportError, Result};
use crate::mapping::RecordMapper;
use crate::observability::{ExportMetrics, StructuredLogger};
use crate::schema::SchemaProvisioner;
use crate::sink::{Sink, Transaction};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Persists one batch of one record kind, all or nothing.
///
/// A call acquires a single connection, provisions the schema on it when
/// `auto_create_tables` is set, then inserts every row inside one
/// transaction. Cancellation and the export deadline are checked before each
/// statement and before commit; an interrupted or failed batch is rolled
/// back by the [`Transaction`] guard.
pub struct BatchWriter<M: RecordMapper> {
    sink: Arc<dyn Sink>,
    options: Arc<ExporterOptions>,
    provisioner: SchemaProvisioner,
    insert_sql: String,
    logger: StructuredLogger,
    metrics: ExportMetrics,
    _mapper: PhantomData<fn() -> M>,
}

impl<M: RecordMapper> Clone for BatchWriter<M> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            options: Arc::clone(&self.options),
            provisioner: self.provisioner.clone(),
            insert_sql: self.insert_sql.clone(),
            logger: self.logger,
            metrics: self.metrics.clone(),
            _mapper: PhantomData,
        }
    }
}

impl<M: RecordMapper> BatchWriter<M> {
    pub fn new(sink: Arc<dyn Sink>, options: Arc<ExporterOptions>) -> Result<Self> {
        let provisioner = SchemaProvisioner::new(options.schema_name.clone())?;
        let insert_sql = M::TABLE.insert_sql(&options.schema_name);
        Ok(Self {
            sink,
            options,
            provisioner,
            insert_sql,
            logger: StructuredLogger::default(),
            metrics: ExportMetrics::new(),
            _mapper: PhantomData,
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> StructuredLogger {
        self.logger
    }

    pub fn metrics(&self) -> &ExportMetrics {
        &self.metrics
    }

    pub fn write(&self, batch: &[M::Record]) -> ExportResult {
        self.write_with_cancel(batch, &CancellationToken::new())
    }

    pub fn write_with_cancel(
        &self,
        batch: &[M::Record],
        cancel: &CancellationToken,
    ) -> ExportResult {
        if batch.is_empty() {
            return ExportResult::Success;
        }

        let started = Instant::now();
        match self.try_write(batch, cancel, started) {
            Ok(_) => {
                self.metrics.record_success(batch.len(), started.elapsed());
                self.logger.log_export(M::KIND, batch.len());
                ExportResult::Success
            }
            Err(e) => {
                self.metrics.record_failure();
                self.logger.log_export_failure(M::KIND, &e);
                ExportResult::Failure
            }
        }
    }

    /// Returns the number of rows inserted.
    pub fn try_write(
        &self,
        batch: &[M::Record],
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<usize> {
        self.check_interrupt(cancel, started)?;
        let mut conn = self.sink.connect()?;

        if self.options.auto_create_tables {
            self.provisioner.ensure_on(conn.as_mut())?;
            self.logger.log_provisioned(self.provisioner.schema());
        }

        let mut txn = Transaction::begin(conn.as_mut())?;
        let mut rows = 0usize;
        for record in batch {
            for params in M::map(record) {
                self.check_interrupt(cancel, started)?;
                txn.execute(&self.insert_sql, &params)?;
                rows += 1;
            }
        }

        self.check_interrupt(cancel, started)?;
        txn.commit()?;
        Ok(rows)
    }

    fn check_interrupt(&self, cancel: &CancellationToken, started: Instant) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        if started.elapsed() >= self.options.export_timeout() {
            return Err(ExportError::Timeout(self.options.export_timeout_ms));
        }
        Ok(())
    }
}
