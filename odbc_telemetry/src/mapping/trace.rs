use super::RecordMapper;
use crate::model::{SpanData, SpanEvent};
use crate::protocol::{format_timestamp, ParamValue};
use crate::schema::Table;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ns: i64,
    pub status_code: i32,
    pub status_message: Option<String>,
    pub attributes: Value,
    pub events: Value,
    pub resource: Value,
}

impl TraceRow {
    pub fn from_span(span: &SpanData) -> Self {
        // A clock step on the producer can yield end < start.
        let end_time = span.end_time.max(span.start_time);
        let duration_ns = (end_time - span.start_time)
            .num_nanoseconds()
            .unwrap_or(i64::MAX);

        Self {
            trace_id: span.trace_id.to_hex(),
            span_id: span.span_id.to_hex(),
            parent_span_id: span
                .parent_span_id
                .filter(|id| id.is_valid())
                .map(|id| id.to_hex()),
            operation_name: span.name.clone(),
            start_time: span.start_time,
            end_time,
            duration_ns,
            status_code: span.status.code(),
            status_message: span.status.message().map(str::to_string),
            attributes: span.attributes.to_json(),
            events: events_json(&span.events),
            resource: span.resource.to_json(),
        }
    }

    pub fn into_params(self) -> Vec<ParamValue> {
        vec![
            ParamValue::Text(self.trace_id),
            ParamValue::Text(self.span_id),
            self.parent_span_id
                .map(ParamValue::Text)
                .unwrap_or(ParamValue::Null),
            ParamValue::Text(self.operation_name),
            ParamValue::Timestamp(self.start_time),
            ParamValue::Timestamp(self.end_time),
            ParamValue::BigInt(self.duration_ns),
            ParamValue::Integer(self.status_code),
            self.status_message
                .map(ParamValue::Text)
                .unwrap_or(ParamValue::Null),
            ParamValue::json(&self.attributes),
            ParamValue::json(&self.events),
            ParamValue::json(&self.resource),
        ]
    }
}

fn events_json(events: &[SpanEvent]) -> Value {
    Value::Array(
        events
            .iter()
            .map(|event| {
                json!({
                    "name": event.name,
                    "timestamp": format_timestamp(&event.timestamp),
                    "attributes": event.attributes.to_json(),
                })
            })
            .collect(),
    )
}

pub struct TraceMapper;

impl RecordMapper for TraceMapper {
    type Record = SpanData;
    const TABLE: Table = Table::Traces;
    const KIND: &'static str = "span";

    fn map(record: &SpanData) -> Vec<Vec<ParamValue>> {
        vec![TraceRow::from_span(record).into_params()]
    }
}
