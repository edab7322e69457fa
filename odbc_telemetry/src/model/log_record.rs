use super::attributes::{Attributes, SpanId, TraceId};
use chrono::{DateTime, Utc};

/// Log level. Number and text written to the sink both derive from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// OpenTelemetry severity number of the level's base step.
    pub fn number(self) -> i32 {
        match self {
            Severity::Trace => 1,
            Severity::Debug => 5,
            Severity::Info => 9,
            Severity::Warn => 13,
            Severity::Error => 17,
            Severity::Fatal => 21,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Severity::Trace,
            log::Level::Debug => Severity::Debug,
            log::Level::Info => Severity::Info,
            log::Level::Warn => Severity::Warn,
            log::Level::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventId {
    pub id: i32,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogData {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub formatted_message: Option<String>,
    pub attributes: Attributes,
    pub trace_id: Option<TraceId>,
    pub span_id: Option<SpanId>,
    pub category_name: Option<String>,
    pub event_id: Option<EventId>,
}

impl LogData {
    pub fn new(timestamp: DateTime<Utc>, severity: Severity) -> Self {
        Self {
            timestamp,
            severity,
            formatted_message: None,
            attributes: Attributes::new(),
            trace_id: None,
            span_id: None,
            category_name: None,
            event_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.formatted_message = Some(message.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_trace_context(mut self, trace_id: TraceId, span_id: SpanId) -> Self {
        self.trace_id = Some(trace_id);
        self.span_id = Some(span_id);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_name = Some(category.into());
        self
    }

    pub fn with_event_id(mut self, id: i32, name: Option<&str>) -> Self {
        self.event_id = Some(EventId {
            id,
            name: name.map(str::to_string),
        });
        self
    }
}
