/// Batch export against the in-memory sink: row shapes and the
/// all-or-nothing contract.
use odbc_telemetry::sink::MemorySink;
use odbc_telemetry::{
    Attributes, ExportResult, ExporterOptions, LogExporter, LogMapper, MetricExporter,
    MetricMapper, MetricType, ParamValue, PointValue, SpanEvent, SpanStatus, TraceExporter,
    TraceMapper,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

mod helpers;
use helpers::{log_record, memory_exporter, metric_record, span_record};

fn options() -> ExporterOptions {
    ExporterOptions::new("DSN=memory")
}

#[test]
fn test_empty_batch_succeeds_without_connecting() {
    let (exporter, sink) = memory_exporter::<TraceMapper>(options());

    assert_eq!(exporter.export(&[]), ExportResult::Success);

    let stats = sink.stats();
    assert_eq!(stats.connections_opened, 0);
    assert!(stats.statements.is_empty());
    assert!(sink.tables().is_empty());
}

#[test]
fn test_batch_writes_one_row_per_span_in_one_transaction() {
    let (exporter, sink) = memory_exporter::<TraceMapper>(options());
    let spans: Vec<_> = (0..5).map(span_record).collect();

    assert_eq!(exporter.export(&spans), ExportResult::Success);

    assert_eq!(sink.row_count("telemetry.traces"), 5);
    let stats = sink.stats();
    assert_eq!(stats.connections_opened, 1);
    assert_eq!(stats.transactions_begun, 1);
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.rollbacks, 0);

    let names: Vec<_> = sink
        .rows("telemetry.traces")
        .iter()
        .map(|r| {
            r.get("operation_name")
                .and_then(ParamValue::as_str)
                .map(str::to_string)
        })
        .collect();
    let expected: Vec<_> = (0..5).map(|n| Some(format!("operation_{}", n))).collect();
    assert_eq!(names, expected, "rows keep input order");
}

#[test]
fn test_failed_insert_rolls_back_whole_batch() {
    let (exporter, sink) = memory_exporter::<TraceMapper>(options());
    sink.fail_insert_at(3);

    let spans: Vec<_> = (0..5).map(span_record).collect();
    assert_eq!(exporter.export(&spans), ExportResult::Failure);

    assert_eq!(sink.row_count("telemetry.traces"), 0);
    assert_eq!(sink.stats().rollbacks, 1);
    assert_eq!(sink.stats().commits, 0);
    assert_eq!(exporter.metrics().failed_batches(), 1);
}

#[test]
fn test_duplicate_span_key_fails_batch() {
    let (exporter, sink) = memory_exporter::<TraceMapper>(options());
    let batch = vec![span_record(1), span_record(2), span_record(1)];

    assert_eq!(exporter.export(&batch), ExportResult::Failure);
    assert_eq!(sink.row_count("telemetry.traces"), 0);

    // The same span in a later batch collides with the committed row.
    assert_eq!(exporter.export(&[span_record(7)]), ExportResult::Success);
    assert_eq!(exporter.export(&[span_record(7)]), ExportResult::Failure);
    assert_eq!(sink.row_count("telemetry.traces"), 1);
}

#[test]
fn test_unreachable_sink_reports_failure() {
    let (exporter, sink) = memory_exporter::<LogMapper>(options());
    sink.fail_connections(true);

    assert_eq!(
        exporter.export(&[log_record("lost")]),
        ExportResult::Failure
    );

    sink.fail_connections(false);
    assert_eq!(
        exporter.export(&[log_record("back")]),
        ExportResult::Success
    );
    assert_eq!(sink.row_count("telemetry.logs"), 1);
}

#[test]
fn test_process_order_span_row() {
    let (exporter, sink) = memory_exporter::<TraceMapper>(options());
    let start = chrono::Utc::now();
    let span = odbc_telemetry::SpanData::new(
        odbc_telemetry::TraceId(0x1234),
        odbc_telemetry::SpanId(0x99),
        "process_order",
        start,
        start + chrono::Duration::milliseconds(42),
    )
    .with_status(SpanStatus::Ok)
    .with_attributes(
        Attributes::new()
            .with("order.id", "ORD-1001")
            .with("order.total", 99.5),
    );

    assert_eq!(exporter.export(&[span]), ExportResult::Success);

    let rows = sink.rows("telemetry.traces");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(
        row.get("operation_name").and_then(ParamValue::as_str),
        Some("process_order")
    );
    assert_eq!(row.get("status_code").and_then(ParamValue::as_i64), Some(0));
    assert_eq!(row.get("status_message"), Some(&ParamValue::Null));
    assert_eq!(
        row.get("duration_ns").and_then(ParamValue::as_i64),
        Some(42_000_000)
    );

    let attributes = row.get("attributes").and_then(ParamValue::as_json).unwrap();
    let keys: BTreeSet<_> = attributes.as_object().unwrap().keys().cloned().collect();
    assert_eq!(
        keys,
        ["order.id", "order.total"]
            .iter()
            .map(|s| s.to_string())
            .collect::<BTreeSet<String>>()
    );
}

#[test]
fn test_span_attributes_and_events_round_trip() {
    let (exporter, sink) = memory_exporter::<TraceMapper>(options());
    let base = span_record(3);
    let span = base
        .clone()
        .with_attributes(
            Attributes::new()
                .with("http.method", "POST")
                .with("http.status_code", 201i64)
                .with("cache.hit", false),
        )
        .with_event(SpanEvent::new("request.received", base.start_time))
        .with_event(
            SpanEvent::new("response.sent", base.end_time)
                .with_attributes(Attributes::new().with("bytes", 512i64)),
        );

    assert_eq!(exporter.export(&[span]), ExportResult::Success);

    let row = &sink.rows("telemetry.traces")[0];
    let attributes = row.get("attributes").and_then(ParamValue::as_json).unwrap();
    assert_eq!(
        attributes,
        json!({"http.method": "POST", "http.status_code": 201, "cache.hit": false})
    );

    let events = row.get("events").and_then(ParamValue::as_json).unwrap();
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["name"], "request.received");
    assert_eq!(events[1]["attributes"]["bytes"], 512);

    let resource = row.get("resource").and_then(ParamValue::as_json).unwrap();
    assert_eq!(resource["service.name"], "integration-tests");
    assert_eq!(resource["service.version"], "1.0.0");
}

#[test]
fn test_long_sum_point_value() {
    let (exporter, sink) = memory_exporter::<MetricMapper>(options());
    let metric = metric_record("orders.count", MetricType::LongSum, PointValue::Long(7));

    assert_eq!(exporter.export(&[metric]), ExportResult::Success);

    let rows = sink.rows("telemetry.metrics");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("metric_value").and_then(ParamValue::as_f64),
        Some(7.0)
    );
    assert_eq!(
        rows[0].get("metric_type").and_then(ParamValue::as_str),
        Some("LongSum")
    );
}

#[test]
fn test_unrecognized_metric_type_stores_null_value() {
    let (exporter, sink) = memory_exporter::<MetricMapper>(options());
    let metric = metric_record(
        "custom.signal",
        MetricType::Other("Unrecognized".to_string()),
        PointValue::Double(1.5),
    );

    assert_eq!(exporter.export(&[metric]), ExportResult::Success);

    let rows = sink.rows("telemetry.metrics");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("metric_value"), Some(&ParamValue::NullDouble));
}

#[test]
fn test_metric_with_several_points_and_no_points() {
    let (exporter, sink) = memory_exporter::<MetricMapper>(options());
    let mut busy = metric_record("queue.depth", MetricType::LongGauge, PointValue::Long(3));
    busy.points.push(busy.points[0].clone());
    let idle = odbc_telemetry::MetricData::new("idle", MetricType::DoubleGauge);

    assert_eq!(exporter.export(&[busy, idle]), ExportResult::Success);
    assert_eq!(sink.row_count("telemetry.metrics"), 2);
}

#[test]
fn test_log_without_trace_context() {
    let (exporter, sink) = memory_exporter::<LogMapper>(options());

    assert_eq!(
        exporter.export(&[log_record("Payment accepted")]),
        ExportResult::Success
    );

    let row = &sink.rows("telemetry.logs")[0];
    assert_eq!(row.get("trace_id"), Some(&ParamValue::Null));
    assert_eq!(row.get("span_id"), Some(&ParamValue::Null));
    assert_eq!(
        row.get("body").and_then(ParamValue::as_str),
        Some("Payment accepted")
    );
    assert_eq!(
        row.get("severity_number").and_then(ParamValue::as_i64),
        Some(9)
    );
    assert_eq!(
        row.get("severity_text").and_then(ParamValue::as_str),
        Some("INFO")
    );
    assert_eq!(
        row.get("resource").and_then(ParamValue::as_json),
        Some(json!({"category.name": "IntegrationTests"}))
    );
}

#[test]
fn test_custom_schema_name() {
    let (exporter, sink) = memory_exporter::<LogMapper>(options().with_schema("observability"));

    assert_eq!(exporter.export(&[log_record("x")]), ExportResult::Success);
    assert_eq!(sink.schemas(), vec!["observability".to_string()]);
    assert_eq!(sink.row_count("observability.logs"), 1);
}

#[test]
fn test_kinds_do_not_share_tables() {
    let sink = MemorySink::new();
    let shared: Arc<dyn odbc_telemetry::Sink> = Arc::new(sink.clone());
    let traces = TraceExporter::with_sink(options(), Arc::clone(&shared)).unwrap();
    let metrics = MetricExporter::with_sink(options(), Arc::clone(&shared)).unwrap();
    let logs = LogExporter::with_sink(options(), shared).unwrap();

    assert!(traces.export(&[span_record(1)]).is_success());
    let point = metric_record("m", MetricType::DoubleSum, PointValue::Double(2.0));
    assert!(metrics.export(&[point]).is_success());
    assert!(logs.export(&[log_record("l")]).is_success());

    assert_eq!(sink.row_count("telemetry.traces"), 1);
    assert_eq!(sink.row_count("telemetry.metrics"), 1);
    assert_eq!(sink.row_count("telemetry.logs"), 1);
}
