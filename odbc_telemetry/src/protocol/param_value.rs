use chrono::{DateTime, SecondsFormat, Utc};
use odbc_api::parameter::InputParameter;
use odbc_api::IntoParameter;

/// A single value bound to a `?` placeholder of an insert.
///
/// Timestamps and JSON documents travel as text and are cast by the
/// statement (`CAST(? AS TIMESTAMPTZ)`, `CAST(? AS JSONB)`), which keeps the
/// binding independent of driver-specific interval/json support.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    Json(String),
    /// NULL bound as `VARCHAR`, for text columns.
    Null,
    /// NULL bound as `DOUBLE`, for `DOUBLE PRECISION` columns.
    NullDouble,
}

impl ParamValue {
    pub fn text_or_null(value: Option<&str>) -> Self {
        value
            .map(|s| ParamValue::Text(s.to_string()))
            .unwrap_or(ParamValue::Null)
    }

    pub fn double_or_null(value: Option<f64>) -> Self {
        value
            .map(ParamValue::Double)
            .unwrap_or(ParamValue::NullDouble)
    }

    pub fn json(value: &serde_json::Value) -> Self {
        ParamValue::Json(value.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null | ParamValue::NullDouble)
    }

    /// Text content of `Text` and `Json` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) | ParamValue::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(n) => Some((*n).into()),
            ParamValue::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ParamValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Parses a `Json` value back into a document.
    pub fn as_json(&self) -> Option<serde_json::Value> {
        match self {
            ParamValue::Json(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }

    pub fn to_input_parameter(&self) -> Box<dyn InputParameter> {
        match self {
            ParamValue::Text(s) | ParamValue::Json(s) => Box::new(s.clone().into_parameter()),
            ParamValue::Integer(n) => Box::new(*n),
            ParamValue::BigInt(n) => Box::new(*n),
            ParamValue::Double(d) => Box::new(*d),
            ParamValue::Timestamp(ts) => Box::new(format_timestamp(ts).into_parameter()),
            ParamValue::Null => Box::new(None::<String>.into_parameter()),
            ParamValue::NullDouble => Box::new(None::<f64>.into_parameter()),
        }
    }
}

/// ISO-8601 with microseconds and an explicit UTC offset.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn to_input_parameters(params: &[ParamValue]) -> Vec<Box<dyn InputParameter>> {
    params.iter().map(ParamValue::to_input_parameter).collect()
}
