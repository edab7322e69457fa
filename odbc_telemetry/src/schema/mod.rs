//! Destination schema: table definitions and idempotent provisioning.

use crate::config::validate_identifier;
use crate::error::{ExportError, Result};
use crate::sink::{Sink, SinkConnection};

/// One of the three destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Traces,
    Metrics,
    Logs,
}

/// Columns that receive a JSON document; bound as text and cast on insert.
const JSON_COLUMNS: [&str; 3] = ["attributes", "events", "resource"];
const TIMESTAMP_COLUMNS: [&str; 3] = ["start_time", "end_time", "timestamp"];

impl Table {
    pub const ALL: [Table; 3] = [Table::Traces, Table::Metrics, Table::Logs];

    pub fn name(self) -> &'static str {
        match self {
            Table::Traces => "traces",
            Table::Metrics => "metrics",
            Table::Logs => "logs",
        }
    }

    /// Insert column list, in bind order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Traces => &[
                "trace_id",
                "span_id",
                "parent_span_id",
                "operation_name",
                "start_time",
                "end_time",
                "duration_ns",
                "status_code",
                "status_message",
                "attributes",
                "events",
                "resource",
            ],
            Table::Metrics => &[
                "metric_name",
                "metric_type",
                "metric_value",
                "metric_unit",
                "timestamp",
                "attributes",
                "resource",
            ],
            Table::Logs => &[
                "timestamp",
                "severity_number",
                "severity_text",
                "body",
                "trace_id",
                "span_id",
                "attributes",
                "resource",
            ],
        }
    }

    pub fn qualified_name(self, schema: &str) -> String {
        format!("{}.{}", schema, self.name())
    }

    pub fn create_sql(self, schema: &str) -> String {
        let table = self.qualified_name(schema);
        match self {
            Table::Traces => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 trace_id VARCHAR(32) NOT NULL, \
                 span_id VARCHAR(16) NOT NULL, \
                 parent_span_id VARCHAR(16), \
                 operation_name TEXT NOT NULL, \
                 start_time TIMESTAMPTZ NOT NULL, \
                 end_time TIMESTAMPTZ NOT NULL, \
                 duration_ns BIGINT NOT NULL, \
                 status_code INTEGER NOT NULL, \
                 status_message TEXT, \
                 attributes JSONB NOT NULL DEFAULT '{{}}', \
                 events JSONB NOT NULL DEFAULT '[]', \
                 resource JSONB NOT NULL DEFAULT '{{}}', \
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
                 PRIMARY KEY (trace_id, span_id))"
            ),
            Table::Metrics => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 id BIGSERIAL PRIMARY KEY, \
                 metric_name TEXT NOT NULL, \
                 metric_type VARCHAR(64) NOT NULL, \
                 metric_value DOUBLE PRECISION, \
                 metric_unit TEXT, \
                 timestamp TIMESTAMPTZ NOT NULL, \
                 attributes JSONB NOT NULL DEFAULT '{{}}', \
                 resource JSONB NOT NULL DEFAULT '{{}}', \
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
            ),
            Table::Logs => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 id BIGSERIAL PRIMARY KEY, \
                 timestamp TIMESTAMPTZ NOT NULL, \
                 severity_number INTEGER NOT NULL, \
                 severity_text VARCHAR(16) NOT NULL, \
                 body TEXT NOT NULL, \
                 trace_id VARCHAR(32), \
                 span_id VARCHAR(16), \
                 attributes JSONB NOT NULL DEFAULT '{{}}', \
                 resource JSONB NOT NULL DEFAULT '{{}}', \
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
            ),
        }
    }

    /// Parameterized insert; only the schema prefix is spliced into the text.
    pub fn insert_sql(self, schema: &str) -> String {
        let columns = self.columns();
        let placeholders: Vec<&str> = columns
            .iter()
            .map(|column| {
                if JSON_COLUMNS.contains(column) {
                    "CAST(? AS JSONB)"
                } else if TIMESTAMP_COLUMNS.contains(column) {
                    "CAST(? AS TIMESTAMPTZ)"
                } else {
                    "?"
                }
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified_name(schema),
            columns.join(", "),
            placeholders.join(", ")
        )
    }
}

pub fn create_schema_sql(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", schema)
}

/// Creates the schema and its three tables when they are missing.
///
/// Every statement is `IF NOT EXISTS`, so running it again, or from several
/// exporters at once, is harmless. A lost creation race that the store still
/// reports as an error ("already exists", catalog unique violation) counts
/// as success.
#[derive(Debug, Clone)]
pub struct SchemaProvisioner {
    schema: String,
}

impl SchemaProvisioner {
    pub fn new(schema: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        validate_identifier(&schema)?;
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Opens its own connection for the duration of provisioning.
    pub fn ensure(&self, sink: &dyn Sink) -> Result<()> {
        let mut conn = sink
            .connect()
            .map_err(|e| ExportError::provisioning(format!("schema {}", self.schema), e))?;
        self.ensure_on(conn.as_mut())
    }

    /// Runs the DDL on an existing connection in autocommit mode.
    pub fn ensure_on(&self, conn: &mut dyn SinkConnection) -> Result<()> {
        self.run_idempotent(
            conn,
            &format!("schema {}", self.schema),
            &create_schema_sql(&self.schema),
        )?;
        for table in Table::ALL {
            self.run_idempotent(
                conn,
                &format!("table {}", table.qualified_name(&self.schema)),
                &table.create_sql(&self.schema),
            )?;
        }
        Ok(())
    }

    fn run_idempotent(
        &self,
        conn: &mut dyn SinkConnection,
        object: &str,
        sql: &str,
    ) -> Result<()> {
        match conn.execute(sql, &[]) {
            Ok(()) => {
                log::debug!("Ensured {}", object);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                log::debug!("{} created concurrently, continuing: {}", object, e);
                Ok(())
            }
            Err(e) => {
                log::error!("Provisioning {} failed: {}", object, e);
                Err(ExportError::provisioning(object, e))
            }
        }
    }
}
