use super::{Sink, SinkConnection};
use crate::config::ExporterOptions;
use crate::error::{ExportError, Result};
use crate::protocol::{to_input_parameters, ParamValue};
use odbc_api::{Connection, ConnectionOptions, Environment};
use r2d2::{Pool, PooledConnection};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

static GLOBAL_ODBC_ENV: OnceLock<std::result::Result<Environment, String>> = OnceLock::new();

fn get_global_odbc_env() -> Result<&'static Environment> {
    let env = GLOBAL_ODBC_ENV.get_or_init(|| {
        Environment::new().map_err(|e| format!("Failed to create ODBC environment: {}", e))
    });

    match env {
        Ok(environment) => Ok(environment),
        Err(msg) => Err(ExportError::Pool(msg.clone())),
    }
}

struct OdbcConnectionManager {
    env: &'static Environment,
    connection_string: String,
    login_timeout_sec: u32,
}

impl r2d2::ManageConnection for OdbcConnectionManager {
    type Connection = Connection<'static>;
    type Error = ExportError;

    fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let options = ConnectionOptions {
            login_timeout_sec: Some(self.login_timeout_sec),
            ..ConnectionOptions::default()
        };
        self.env
            .connect_with_connection_string(&self.connection_string, options)
            .map_err(ExportError::from)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        // A connection handed out must start in autocommit mode.
        conn.set_autocommit(true).map_err(ExportError::from)?;
        conn.execute("SELECT 1", (), None)
            .map(|_| ())
            .map_err(ExportError::from)
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        self.is_valid(conn).is_err()
    }
}

/// Production sink: an ODBC data source behind an r2d2 pool.
///
/// Neither the ODBC environment nor the pool is created until the first
/// [`Sink::connect`], so constructing an exporter against an unreachable
/// server succeeds and the failure surfaces on export.
pub struct OdbcSink {
    connection_string: String,
    max_pool_size: u32,
    timeout: Duration,
    pool: Mutex<Option<Pool<OdbcConnectionManager>>>,
}

impl OdbcSink {
    pub fn new(connection_string: &str, max_pool_size: u32, timeout: Duration) -> Result<Self> {
        if connection_string.trim().is_empty() {
            return Err(ExportError::EmptyConnectionString);
        }
        Ok(Self {
            connection_string: connection_string.to_string(),
            max_pool_size: max_pool_size.max(1),
            timeout,
            pool: Mutex::new(None),
        })
    }

    pub fn from_options(options: &ExporterOptions) -> Result<Self> {
        Self::new(
            &options.connection_string,
            options.max_pool_size,
            options.export_timeout(),
        )
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn max_pool_size(&self) -> u32 {
        self.max_pool_size
    }

    pub fn is_pool_initialized(&self) -> bool {
        self.pool.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    fn timeout_secs(&self) -> u32 {
        self.timeout.as_secs().clamp(1, u32::MAX as u64) as u32
    }

    fn pool(&self) -> Result<Pool<OdbcConnectionManager>> {
        let mut guard = self
            .pool
            .lock()
            .map_err(|_| ExportError::Internal("Failed to lock pool mutex".to_string()))?;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let manager = OdbcConnectionManager {
            env: get_global_odbc_env()?,
            connection_string: self.connection_string.clone(),
            login_timeout_sec: self.timeout_secs(),
        };
        let pool = Pool::builder()
            .max_size(self.max_pool_size)
            .min_idle(Some(0))
            .connection_timeout(self.timeout.max(Duration::from_secs(1)))
            .test_on_check_out(true)
            .build_unchecked(manager);
        *guard = Some(pool.clone());
        Ok(pool)
    }
}

impl Sink for OdbcSink {
    fn connect(&self) -> Result<Box<dyn SinkConnection + '_>> {
        let pooled = self.pool()?.get().map_err(|e| {
            ExportError::Pool(format!("Failed to get connection from pool: {}", e))
        })?;
        Ok(Box::new(OdbcSinkConnection {
            pooled,
            query_timeout_sec: Some(self.timeout_secs() as usize),
            in_transaction: false,
        }))
    }

    fn name(&self) -> &'static str {
        "OdbcSink"
    }
}

struct OdbcSinkConnection {
    pooled: PooledConnection<OdbcConnectionManager>,
    query_timeout_sec: Option<usize>,
    in_transaction: bool,
}

impl SinkConnection for OdbcSinkConnection {
    fn execute(&mut self, sql: &str, params: &[ParamValue]) -> Result<()> {
        let params = to_input_parameters(params);
        self.pooled
            .execute(sql, params.as_slice(), self.query_timeout_sec)
            .map(|_| ())
            .map_err(ExportError::from)
    }

    fn begin(&mut self) -> Result<()> {
        self.pooled.set_autocommit(false)?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        end_transaction(
            &mut *self.pooled,
            |c| c.commit().map_err(ExportError::from),
            |c| c.set_autocommit(true).map_err(ExportError::from),
        )?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        end_transaction(
            &mut *self.pooled,
            |c| c.rollback().map_err(ExportError::from),
            |c| c.set_autocommit(true).map_err(ExportError::from),
        )?;
        self.in_transaction = false;
        Ok(())
    }
}

/// Ends the transaction, then switches autocommit back on.
///
/// Once `end` succeeds the outcome is settled, so a failed restore is only
/// logged; `is_valid` restores autocommit on the next checkout.
fn end_transaction<C: ?Sized>(
    conn: &mut C,
    end: impl FnOnce(&mut C) -> Result<()>,
    restore_autocommit: impl FnOnce(&mut C) -> Result<()>,
) -> Result<()> {
    end(conn)?;
    if let Err(e) = restore_autocommit(conn) {
        log::warn!("Failed to restore autocommit after transaction end: {}", e);
    }
    Ok(())
}

impl Drop for OdbcSinkConnection {
    fn drop(&mut self) {
        // Switching autocommit back on would commit the open work.
        if self.in_transaction {
            let _ = self.pooled.rollback();
            let _ = self.pooled.set_autocommit(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_transaction_ignores_autocommit_restore_failure() {
        let mut calls: Vec<&str> = Vec::new();
        let result = end_transaction(
            &mut calls,
            |c| {
                c.push("commit");
                Ok(())
            },
            |c| {
                c.push("autocommit");
                Err(ExportError::with_sqlstate("08S01", "link failure"))
            },
        );
        assert!(result.is_ok());
        assert_eq!(calls, vec!["commit", "autocommit"]);
    }

    #[test]
    fn test_end_transaction_failure_skips_restore() {
        let mut calls: Vec<&str> = Vec::new();
        let result = end_transaction(
            &mut calls,
            |c| {
                c.push("commit");
                Err(ExportError::with_sqlstate("40001", "serialization failure"))
            },
            |c| {
                c.push("autocommit");
                Ok(())
            },
        );
        assert_eq!(&result.unwrap_err().sqlstate(), b"40001");
        assert_eq!(calls, vec!["commit"]);
    }

    #[test]
    fn test_odbc_sink_rejects_empty_connection_string() {
        match OdbcSink::new("  ", 4, Duration::from_secs(30)) {
            Err(ExportError::EmptyConnectionString) => (),
            _ => panic!("Expected EmptyConnectionString error"),
        }
    }

    #[test]
    fn test_odbc_sink_construction_is_lazy() {
        let sink = OdbcSink::new(
            "Driver={PostgreSQL Unicode};Server=unreachable.invalid;Port=5432;",
            4,
            Duration::from_secs(30),
        )
        .unwrap();
        assert!(!sink.is_pool_initialized());
        assert_eq!(sink.max_pool_size(), 4);
        assert_eq!(sink.name(), "OdbcSink");
    }

    #[test]
    fn test_odbc_sink_from_options() {
        let options = ExporterOptions::new("DSN=telemetry").with_max_pool_size(0);
        let sink = OdbcSink::from_options(&options).unwrap();
        assert_eq!(sink.connection_string(), "DSN=telemetry");
        assert_eq!(sink.max_pool_size(), 1);
    }

    #[test]
    fn test_timeout_secs_never_zero() {
        let sink = OdbcSink::new("DSN=x", 1, Duration::from_millis(200)).unwrap();
        assert_eq!(sink.timeout_secs(), 1);
    }
}
