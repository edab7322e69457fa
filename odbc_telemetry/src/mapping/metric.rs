use super::RecordMapper;
use crate::model::{MetricData, MetricPoint, MetricType, PointValue};
use crate::protocol::ParamValue;
use crate::schema::Table;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub metric_name: String,
    pub metric_type: String,
    pub metric_value: Option<f64>,
    pub metric_unit: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub attributes: Value,
    pub resource: Value,
}

impl MetricRow {
    pub fn from_point(metric: &MetricData, point: &MetricPoint) -> Self {
        Self {
            metric_name: metric.name.clone(),
            metric_type: metric.metric_type.as_str().to_string(),
            metric_value: extract_value(&metric.metric_type, &point.value),
            metric_unit: metric.unit.clone(),
            timestamp: point.end_time,
            attributes: point.attributes.to_json(),
            resource: resource_json(metric),
        }
    }

    pub fn into_params(self) -> Vec<ParamValue> {
        vec![
            ParamValue::Text(self.metric_name),
            ParamValue::Text(self.metric_type),
            ParamValue::double_or_null(self.metric_value),
            self.metric_unit
                .map(ParamValue::Text)
                .unwrap_or(ParamValue::Null),
            ParamValue::Timestamp(self.timestamp),
            ParamValue::json(&self.attributes),
            ParamValue::json(&self.resource),
        ]
    }
}

/// Scalar stored for a point. `None` when the type carries no single value
/// or the point does not match the declared type.
pub fn extract_value(metric_type: &MetricType, value: &PointValue) -> Option<f64> {
    match (metric_type, value) {
        (
            MetricType::LongSum | MetricType::LongSumNonMonotonic | MetricType::LongGauge,
            PointValue::Long(v),
        ) => Some(*v as f64),
        (
            MetricType::DoubleSum | MetricType::DoubleSumNonMonotonic | MetricType::DoubleGauge,
            PointValue::Double(v),
        ) => Some(*v),
        (MetricType::Histogram, PointValue::Histogram { sum, .. }) => Some(*sum),
        _ => None,
    }
}

fn resource_json(metric: &MetricData) -> Value {
    let mut map = Map::new();
    map.insert(
        "metric.name".to_string(),
        Value::String(metric.name.clone()),
    );
    map.insert(
        "metric.description".to_string(),
        metric
            .description
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    if let Some(meter) = &metric.meter_name {
        map.insert("meter.name".to_string(), Value::String(meter.clone()));
    }
    Value::Object(map)
}

pub struct MetricMapper;

impl RecordMapper for MetricMapper {
    type Record = MetricData;
    const TABLE: Table = Table::Metrics;
    const KIND: &'static str = "metric";

    fn map(record: &MetricData) -> Vec<Vec<ParamValue>> {
        record
            .points
            .iter()
            .map(|point| MetricRow::from_point(record, point).into_params())
            .collect()
    }
}
