pub mod config;
mod error;
pub mod exporter;
pub mod mapping;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod schema;
pub mod sink;

pub use config::ExporterOptions;
pub use error::{ErrorCategory, ExportError, Result};
pub use exporter::{
    ExportResult, Exporter, LogExporter, MetricExporter, TelemetryExporter, TraceExporter,
};
pub use mapping::{LogMapper, MetricMapper, RecordMapper, TraceMapper};
pub use model::{
    AttributeValue, Attributes, EventId, KeyValue, LogData, MetricData, MetricPoint, MetricType,
    PointValue, Resource, Severity, SpanData, SpanEvent, SpanId, SpanStatus, TraceId,
};
pub use observability::{ExportMetrics, StructuredLogger};
pub use protocol::ParamValue;
pub use schema::{SchemaProvisioner, Table};
pub use sink::{OdbcSink, Sink, SinkConnection, Transaction};

#[cfg(feature = "test-helpers")]
pub mod test_helpers {
    /// Loads `.env` from the working directory or its parents, if present.
    pub fn load_dotenv() {
        let _ = dotenvy::dotenv();
    }
}
