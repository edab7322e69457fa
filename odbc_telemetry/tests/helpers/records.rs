//! Sample records and exporter wiring shared by the integration tests.

use chrono::{Duration, TimeZone, Utc};
use odbc_telemetry::sink::MemorySink;
use odbc_telemetry::{
    Attributes, Exporter, ExporterOptions, LogData, MetricData, MetricPoint, MetricType,
    PointValue, RecordMapper, Resource, Severity, SpanData, SpanId, SpanStatus, TraceId,
};
use std::sync::Arc;

#[allow(dead_code)]
pub fn span_record(n: u64) -> SpanData {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + Duration::seconds(n as i64);
    SpanData::new(
        TraceId(0xabcdef00_0000_0000_0000_000000000000 + n as u128),
        SpanId(n + 1),
        format!("operation_{}", n),
        start,
        start + Duration::milliseconds(25),
    )
    .with_status(SpanStatus::Ok)
    .with_attributes(Attributes::new().with("iteration", n as i64))
    .with_resource(Resource::new("integration-tests").with_version("1.0.0"))
}

#[allow(dead_code)]
pub fn metric_record(name: &str, metric_type: MetricType, value: PointValue) -> MetricData {
    MetricData::new(name, metric_type)
        .with_unit("1")
        .with_meter("integration-tests")
        .with_point(MetricPoint::new(Utc::now(), value))
}

#[allow(dead_code)]
pub fn log_record(message: &str) -> LogData {
    LogData::new(Utc::now(), Severity::Info)
        .with_message(message)
        .with_category("IntegrationTests")
}

/// Exporter over a fresh in-memory sink, with the sink handle for assertions.
#[allow(dead_code)]
pub fn memory_exporter<M: RecordMapper>(options: ExporterOptions) -> (Exporter<M>, MemorySink) {
    let sink = MemorySink::new();
    let exporter =
        Exporter::<M>::with_sink(options, Arc::new(sink.clone())).expect("valid options");
    (exporter, sink)
}
