use super::RecordMapper;
use crate::model::LogData;
use crate::protocol::ParamValue;
use crate::schema::Table;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Attribute holding the unformatted message template.
pub const ORIGINAL_FORMAT_KEY: &str = "{OriginalFormat}";

#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    pub severity_number: i32,
    pub severity_text: String,
    pub body: String,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub attributes: Value,
    pub resource: Value,
}

impl LogRow {
    pub fn from_log(record: &LogData) -> Self {
        Self {
            timestamp: record.timestamp,
            severity_number: record.severity.number(),
            severity_text: record.severity.text().to_string(),
            body: body(record),
            trace_id: record
                .trace_id
                .filter(|id| id.is_valid())
                .map(|id| id.to_hex()),
            span_id: record
                .span_id
                .filter(|id| id.is_valid())
                .map(|id| id.to_hex()),
            attributes: record.attributes.to_json(),
            resource: resource_json(record),
        }
    }

    pub fn into_params(self) -> Vec<ParamValue> {
        vec![
            ParamValue::Timestamp(self.timestamp),
            ParamValue::Integer(self.severity_number),
            ParamValue::Text(self.severity_text),
            ParamValue::Text(self.body),
            self.trace_id
                .map(ParamValue::Text)
                .unwrap_or(ParamValue::Null),
            self.span_id
                .map(ParamValue::Text)
                .unwrap_or(ParamValue::Null),
            ParamValue::json(&self.attributes),
            ParamValue::json(&self.resource),
        ]
    }
}

fn body(record: &LogData) -> String {
    if let Some(message) = &record.formatted_message {
        return message.clone();
    }
    record
        .attributes
        .get(ORIGINAL_FORMAT_KEY)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn resource_json(record: &LogData) -> Value {
    let mut map = Map::new();
    if let Some(category) = &record.category_name {
        map.insert("category.name".to_string(), Value::String(category.clone()));
    }
    if let Some(event) = &record.event_id {
        map.insert("event.id".to_string(), Value::from(event.id));
        if let Some(name) = &event.name {
            map.insert("event.name".to_string(), Value::String(name.clone()));
        }
    }
    Value::Object(map)
}

pub struct LogMapper;

impl RecordMapper for LogMapper {
    type Record = LogData;
    const TABLE: Table = Table::Logs;
    const KIND: &'static str = "log";

    fn map(record: &LogData) -> Vec<Vec<ParamValue>> {
        vec![LogRow::from_log(record).into_params()]
    }
}
