use super::attributes::Attributes;
use chrono::{DateTime, Utc};
use std::fmt;

/// Instrument kind, as declared by the host for the whole metric stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricType {
    LongSum,
    DoubleSum,
    LongSumNonMonotonic,
    DoubleSumNonMonotonic,
    LongGauge,
    DoubleGauge,
    Histogram,
    ExponentialHistogram,
    Summary,
    Other(String),
}

impl MetricType {
    pub fn as_str(&self) -> &str {
        match self {
            MetricType::LongSum => "LongSum",
            MetricType::DoubleSum => "DoubleSum",
            MetricType::LongSumNonMonotonic => "LongSumNonMonotonic",
            MetricType::DoubleSumNonMonotonic => "DoubleSumNonMonotonic",
            MetricType::LongGauge => "LongGauge",
            MetricType::DoubleGauge => "DoubleGauge",
            MetricType::Histogram => "Histogram",
            MetricType::ExponentialHistogram => "ExponentialHistogram",
            MetricType::Summary => "Summary",
            MetricType::Other(name) => name,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointValue {
    Long(i64),
    Double(f64),
    Histogram {
        count: u64,
        sum: f64,
        bounds: Vec<f64>,
        bucket_counts: Vec<u64>,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub attributes: Attributes,
    pub value: PointValue,
}

impl MetricPoint {
    pub fn new(end_time: DateTime<Utc>, value: PointValue) -> Self {
        Self {
            start_time: None,
            end_time,
            attributes: Attributes::new(),
            value,
        }
    }

    pub fn with_start(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// One instrument's output for a collection cycle: possibly several points,
/// one per attribute set / time window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricData {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub meter_name: Option<String>,
    pub metric_type: MetricType,
    pub points: Vec<MetricPoint>,
}

impl MetricData {
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            description: None,
            unit: None,
            meter_name: None,
            metric_type,
            points: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_meter(mut self, meter_name: impl Into<String>) -> Self {
        self.meter_name = Some(meter_name.into());
        self
    }

    pub fn with_point(mut self, point: MetricPoint) -> Self {
        self.points.push(point);
        self
    }
}
