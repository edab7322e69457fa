//! Record to row conversion, one mapper per record kind.
//!
//! Mappers are pure and total: every field that is missing or malformed
//! degrades to NULL or an empty JSON container instead of failing the batch.

pub mod log;
pub mod metric;
pub mod trace;

pub use self::log::{LogMapper, LogRow, ORIGINAL_FORMAT_KEY};
pub use self::metric::{extract_value, MetricMapper, MetricRow};
pub use self::trace::{TraceMapper, TraceRow};

use crate::protocol::ParamValue;
use crate::schema::Table;

pub trait RecordMapper: Send + Sync + 'static {
    type Record: Send + Sync + 'static;

    /// Destination table; row values are bound in `TABLE.columns()` order.
    const TABLE: Table;

    /// Human name used in diagnostics ("span", "metric", "log").
    const KIND: &'static str;

    /// One entry per row. A record may expand to zero or more rows.
    fn map(record: &Self::Record) -> Vec<Vec<ParamValue>>;
}
