//! Boundary with the relational store.
//!
//! A [`Sink`] hands out connections; a [`SinkConnection`] runs parameterized
//! statements and controls the transaction. [`Transaction`] scopes one
//! transaction to a borrow of the connection and rolls back whatever was not
//! committed when it goes out of scope.

#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;
pub mod odbc;

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::{MemoryRow, MemorySink, MemorySinkStats};
pub use odbc::OdbcSink;

use crate::error::{ExportError, Result};
use crate::protocol::ParamValue;

pub trait SinkConnection {
    /// Runs one statement. Outside a transaction it is committed immediately.
    fn execute(&mut self, sql: &str, params: &[ParamValue]) -> Result<()>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

pub trait Sink: Send + Sync {
    /// Acquires a connection; it is released when the box is dropped.
    fn connect(&self) -> Result<Box<dyn SinkConnection + '_>>;

    fn name(&self) -> &'static str {
        "Sink"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

pub struct Transaction<'c> {
    conn: &'c mut dyn SinkConnection,
    state: TransactionState,
}

impl<'c> Transaction<'c> {
    pub fn begin(conn: &'c mut dyn SinkConnection) -> Result<Self> {
        conn.begin()?;
        Ok(Self {
            conn,
            state: TransactionState::Active,
        })
    }

    pub fn execute(&mut self, sql: &str, params: &[ParamValue]) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(ExportError::Internal(format!(
                "Cannot execute: transaction state is {:?}",
                self.state
            )));
        }
        self.conn.execute(sql, params)
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.commit()?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.conn.rollback()?;
        self.state = TransactionState::RolledBack;
        Ok(())
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            log::warn!("Transaction dropped without commit - auto-rollback");
            if let Err(e) = self.conn.rollback() {
                log::error!("Auto-rollback failed: {}", e);
            }
        }
    }
}
