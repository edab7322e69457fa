//! In-memory telemetry records as handed over by the instrumentation host.
//!
//! The pipeline only reads these; rows for the sink are derived from them by
//! the mappers in [`crate::mapping`].

pub mod attributes;
pub mod log_record;
pub mod metric;
pub mod span;

pub use attributes::{AttributeValue, Attributes, KeyValue, Resource, SpanId, TraceId};
pub use log_record::{EventId, LogData, Severity};
pub use metric::{MetricData, MetricPoint, MetricType, PointValue};
pub use span::{SpanData, SpanEvent, SpanStatus};
