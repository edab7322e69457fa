//! In-process sink for tests.
//!
//! Understands exactly the statement shapes the exporters issue (schema and
//! table creation, inserts), enforces table-level primary keys, and keeps
//! uncommitted rows invisible until commit. Faults can be injected to drive
//! the failure paths.

use super::{Sink, SinkConnection};
use crate::error::{ExportError, Result};
use crate::protocol::ParamValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const CREATE_SCHEMA: &str = "CREATE SCHEMA IF NOT EXISTS ";
const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS ";
const INSERT_INTO: &str = "INSERT INTO ";
const PRIMARY_KEY: &str = "PRIMARY KEY (";

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    values: Vec<(String, ParamValue)>,
}

impl MemoryRow {
    pub fn get(&self, column: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    fn key(&self, primary_key: &[String]) -> Vec<Option<ParamValue>> {
        primary_key
            .iter()
            .map(|column| self.get(column).cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySinkStats {
    pub connections_opened: usize,
    pub transactions_begun: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub statements: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    primary_key: Vec<String>,
    rows: Vec<MemoryRow>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_connect: bool,
    fail_ddl: Option<String>,
    report_existing: bool,
    fail_insert_at: Option<usize>,
    insert_delay: Option<Duration>,
    commit_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryState {
    schemas: BTreeSet<String>,
    tables: BTreeMap<String, MemoryTable>,
    faults: Faults,
    stats: MemorySinkStats,
    inserts_attempted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        lock_state(&self.state)
    }

    /// Every `connect` fails with SQLSTATE 08001.
    pub fn fail_connections(&self, enabled: bool) {
        if let Ok(mut state) = self.lock() {
            state.faults.fail_connect = enabled;
        }
    }

    /// Every DDL statement fails with the given SQLSTATE.
    pub fn fail_ddl_with(&self, sqlstate: &str) {
        if let Ok(mut state) = self.lock() {
            state.faults.fail_ddl = Some(sqlstate.to_string());
        }
    }

    /// Creating an object that already exists raises 42P06/42P07 instead of
    /// being a silent no-op, like a concurrent creator losing the race.
    pub fn report_existing_objects(&self, enabled: bool) {
        if let Ok(mut state) = self.lock() {
            state.faults.report_existing = enabled;
        }
    }

    /// The n-th insert (1-based, counted across all connections) fails.
    pub fn fail_insert_at(&self, n: usize) {
        if let Ok(mut state) = self.lock() {
            state.faults.fail_insert_at = Some(n);
        }
    }

    /// Every insert sleeps before executing.
    pub fn delay_inserts(&self, delay: Duration) {
        if let Ok(mut state) = self.lock() {
            state.faults.insert_delay = Some(delay);
        }
    }

    /// Every commit sleeps before making its rows visible.
    pub fn delay_commits(&self, delay: Duration) {
        if let Ok(mut state) = self.lock() {
            state.faults.commit_delay = Some(delay);
        }
    }

    pub fn reset_faults(&self) {
        if let Ok(mut state) = self.lock() {
            state.faults = Faults::default();
            state.inserts_attempted = 0;
        }
    }

    pub fn schemas(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.schemas.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Qualified names (`schema.table`) of existing tables.
    pub fn tables(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed rows of a table.
    pub fn rows(&self, qualified_table: &str) -> Vec<MemoryRow> {
        self.lock()
            .ok()
            .and_then(|s| s.tables.get(qualified_table).map(|t| t.rows.clone()))
            .unwrap_or_default()
    }

    pub fn row_count(&self, qualified_table: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|s| s.tables.get(qualified_table).map(|t| t.rows.len()))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> MemorySinkStats {
        self.lock().map(|s| s.stats.clone()).unwrap_or_default()
    }
}

impl Sink for MemorySink {
    fn connect(&self) -> Result<Box<dyn SinkConnection + '_>> {
        let mut state = self.lock()?;
        if state.faults.fail_connect {
            return Err(ExportError::with_sqlstate(
                "08001",
                "could not connect to server: Connection refused",
            ));
        }
        state.stats.connections_opened += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            pending: None,
        }))
    }

    fn name(&self) -> &'static str {
        "MemorySink"
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>> {
    state
        .lock()
        .map_err(|_| ExportError::Internal("Failed to lock memory sink state".to_string()))
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    /// Rows inserted in the open transaction, keyed by qualified table name.
    pending: Option<Vec<(String, MemoryRow)>>,
}

impl MemoryConnection {
    fn create_schema(&mut self, name: &str) -> Result<()> {
        let mut state = lock_state(&self.state)?;
        check_ddl_fault(&state)?;
        if state.schemas.contains(name) {
            if state.faults.report_existing {
                return Err(ExportError::with_sqlstate(
                    "42P06",
                    format!("schema \"{}\" already exists", name),
                ));
            }
            return Ok(());
        }
        state.schemas.insert(name.to_string());
        Ok(())
    }

    fn create_table(&mut self, rest: &str) -> Result<()> {
        let (qualified, definition) = rest
            .split_once(" (")
            .ok_or_else(|| ExportError::with_sqlstate("42601", "syntax error in CREATE TABLE"))?;
        let qualified = qualified.trim();

        let mut state = lock_state(&self.state)?;
        check_ddl_fault(&state)?;
        let schema = qualified.split('.').next().unwrap_or_default();
        if !state.schemas.contains(schema) {
            return Err(ExportError::with_sqlstate(
                "3F000",
                format!("schema \"{}\" does not exist", schema),
            ));
        }
        if state.tables.contains_key(qualified) {
            if state.faults.report_existing {
                return Err(ExportError::with_sqlstate(
                    "42P07",
                    format!("relation \"{}\" already exists", qualified),
                ));
            }
            return Ok(());
        }

        state.tables.insert(
            qualified.to_string(),
            MemoryTable {
                primary_key: parse_table_primary_key(definition),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn insert(&mut self, rest: &str, params: &[ParamValue]) -> Result<()> {
        let (qualified, tail) = rest
            .split_once(" (")
            .ok_or_else(|| ExportError::with_sqlstate("42601", "syntax error in INSERT"))?;
        let qualified = qualified.trim().to_string();
        let columns: Vec<String> = tail
            .split(')')
            .next()
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_string())
            .collect();

        let delay = {
            let mut state = lock_state(&self.state)?;
            state.inserts_attempted += 1;
            if state.faults.fail_insert_at == Some(state.inserts_attempted) {
                return Err(ExportError::with_sqlstate(
                    "22P02",
                    "invalid input syntax (injected)",
                ));
            }
            state.faults.insert_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if columns.len() != params.len() {
            return Err(ExportError::with_sqlstate(
                "07002",
                format!(
                    "{} columns but {} parameters bound",
                    columns.len(),
                    params.len()
                ),
            ));
        }
        let row = MemoryRow {
            values: columns.into_iter().zip(params.iter().cloned()).collect(),
        };

        let mut state = lock_state(&self.state)?;
        let table = state.tables.get_mut(&qualified).ok_or_else(|| {
            ExportError::with_sqlstate(
                "42P01",
                format!("relation \"{}\" does not exist", qualified),
            )
        })?;

        if !table.primary_key.is_empty() {
            let key = row.key(&table.primary_key);
            let committed_clash = table.rows.iter().any(|r| r.key(&table.primary_key) == key);
            let pending_clash = self.pending.iter().flatten().any(|(t, r)| {
                *t == qualified && r.key(&table.primary_key) == key
            });
            if committed_clash || pending_clash {
                return Err(ExportError::with_sqlstate(
                    "23505",
                    format!(
                        "duplicate key value violates unique constraint \"{}_pkey\"",
                        qualified
                    ),
                ));
            }
        }

        match self.pending.as_mut() {
            Some(pending) => pending.push((qualified, row)),
            None => table.rows.push(row),
        }
        Ok(())
    }
}

fn check_ddl_fault(state: &MemoryState) -> Result<()> {
    match &state.faults.fail_ddl {
        Some(sqlstate) => Err(ExportError::with_sqlstate(
            sqlstate,
            "permission denied for database",
        )),
        None => Ok(()),
    }
}

/// Columns of a table-level `PRIMARY KEY (a, b)` clause. Inline
/// `id ... PRIMARY KEY` surrogate keys are generated, so never clash.
fn parse_table_primary_key(definition: &str) -> Vec<String> {
    definition
        .find(PRIMARY_KEY)
        .and_then(|start| {
            let tail = &definition[start + PRIMARY_KEY.len()..];
            tail.split(')').next()
        })
        .map(|cols| cols.split(',').map(|c| c.trim().to_string()).collect())
        .unwrap_or_default()
}

impl SinkConnection for MemoryConnection {
    fn execute(&mut self, sql: &str, params: &[ParamValue]) -> Result<()> {
        lock_state(&self.state)?.stats.statements.push(sql.to_string());

        if let Some(name) = sql.strip_prefix(CREATE_SCHEMA) {
            self.create_schema(name.trim())
        } else if let Some(rest) = sql.strip_prefix(CREATE_TABLE) {
            self.create_table(rest)
        } else if let Some(rest) = sql.strip_prefix(INSERT_INTO) {
            self.insert(rest, params)
        } else {
            Err(ExportError::Sink(format!("Unsupported statement: {}", sql)))
        }
    }

    fn begin(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(ExportError::Sink("Transaction already active".to_string()));
        }
        lock_state(&self.state)?.stats.transactions_begun += 1;
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| ExportError::Sink("No active transaction".to_string()))?;
        let delay = lock_state(&self.state)?.faults.commit_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = lock_state(&self.state)?;
        for (table, row) in pending {
            if let Some(t) = state.tables.get_mut(&table) {
                t.rows.push(row);
            }
        }
        state.stats.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.pending = None;
        lock_state(&self.state)?.stats.rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSERT_ROW: &str = "INSERT INTO s.t (a, b) VALUES (?, ?)";

    fn provision(conn: &mut dyn SinkConnection) {
        conn.execute("CREATE SCHEMA IF NOT EXISTS s", &[]).unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS s.t (a TEXT NOT NULL, b TEXT NOT NULL, PRIMARY KEY (a, b))",
            &[],
        )
        .unwrap();
    }

    fn text(s: &str) -> ParamValue {
        ParamValue::Text(s.to_string())
    }

    #[test]
    fn test_parse_table_primary_key() {
        assert_eq!(
            parse_table_primary_key("x TEXT, PRIMARY KEY (trace_id, span_id))"),
            vec!["trace_id".to_string(), "span_id".to_string()]
        );
        assert!(parse_table_primary_key("id BIGSERIAL PRIMARY KEY, v TEXT)").is_empty());
    }

    #[test]
    fn test_table_requires_schema() {
        let sink = MemorySink::new();
        let mut conn = sink.connect().unwrap();
        let err = conn
            .execute("CREATE TABLE IF NOT EXISTS s.t (a TEXT)", &[])
            .unwrap_err();
        assert_eq!(&err.sqlstate(), b"3F000");
    }

    #[test]
    fn test_autocommit_insert_is_visible() {
        let sink = MemorySink::new();
        let mut conn = sink.connect().unwrap();
        provision(conn.as_mut());
        conn.execute(INSERT_ROW, &[text("1"), text("2")]).unwrap();
        assert_eq!(sink.row_count("s.t"), 1);
        assert_eq!(
            sink.rows("s.t")[0].get("b"),
            Some(&ParamValue::Text("2".to_string()))
        );
    }

    #[test]
    fn test_pending_rows_hidden_until_commit() {
        let sink = MemorySink::new();
        let mut conn = sink.connect().unwrap();
        provision(conn.as_mut());
        conn.begin().unwrap();
        conn.execute(INSERT_ROW, &[text("1"), text("2")]).unwrap();
        assert_eq!(sink.row_count("s.t"), 0);
        conn.commit().unwrap();
        assert_eq!(sink.row_count("s.t"), 1);
    }

    #[test]
    fn test_rollback_discards_pending_rows() {
        let sink = MemorySink::new();
        let mut conn = sink.connect().unwrap();
        provision(conn.as_mut());
        conn.begin().unwrap();
        conn.execute(INSERT_ROW, &[text("1"), text("2")]).unwrap();
        conn.rollback().unwrap();
        assert_eq!(sink.row_count("s.t"), 0);
        assert_eq!(sink.stats().rollbacks, 1);
    }

    #[test]
    fn test_primary_key_violation_within_transaction() {
        let sink = MemorySink::new();
        let mut conn = sink.connect().unwrap();
        provision(conn.as_mut());
        conn.begin().unwrap();
        conn.execute(INSERT_ROW, &[text("1"), text("2")]).unwrap();
        let err = conn
            .execute(INSERT_ROW, &[text("1"), text("2")])
            .unwrap_err();
        assert_eq!(&err.sqlstate(), b"23505");
    }

    #[test]
    fn test_report_existing_objects() {
        let sink = MemorySink::new();
        let mut conn = sink.connect().unwrap();
        provision(conn.as_mut());
        sink.report_existing_objects(true);
        let err = conn
            .execute("CREATE SCHEMA IF NOT EXISTS s", &[])
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_fail_connections() {
        let sink = MemorySink::new();
        sink.fail_connections(true);
        assert!(sink.connect().is_err());
        assert_eq!(sink.stats().connections_opened, 0);
    }

    #[test]
    fn test_unsupported_statement() {
        let sink = MemorySink::new();
        let mut conn = sink.connect().unwrap();
        assert!(matches!(
            conn.execute("DROP TABLE s.t", &[]),
            Err(ExportError::Sink(_))
        ));
    }
}
