use odbc_api::handles::Record as OdbcRecord;
use thiserror::Error;

/// Error category for deciding what a failed export means to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid options; raised at construction, never at export time
    Configuration,
    /// Transient error - a later export may succeed
    Transient,
    /// Connection to the sink lost or never established
    ConnectionLost,
    /// Integrity constraint violated (e.g. duplicate span key)
    Constraint,
    /// Anything else
    Fatal,
}

/// SQLSTATEs the sink reports when a concurrent `CREATE ... IF NOT EXISTS`
/// lost the race against another writer.
const ALREADY_EXISTS_SQLSTATES: [&[u8; 5]; 4] = [
    b"42P06", // duplicate_schema
    b"42P07", // duplicate_table
    b"42S01", // base table or view already exists
    b"23505", // unique_violation on the catalog
];

#[derive(Error, Debug, Clone)]
pub enum ExportError {
    #[error("Connection string is empty")]
    EmptyConnectionString,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("ODBC error: {0}")]
    Odbc(String),

    #[error("Structured error: {message}")]
    Structured {
        sqlstate: [u8; 5],
        native_code: i32,
        message: String,
    },

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Provisioning of {object} failed: {source}")]
    Provisioning {
        object: String,
        #[source]
        source: Box<ExportError>,
    },

    #[error("Export cancelled")]
    Cancelled,

    #[error("Export timed out after {0}ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<odbc_api::Error> for ExportError {
    fn from(err: odbc_api::Error) -> Self {
        if let Some(structured) = try_extract_structured(&err) {
            return structured;
        }
        ExportError::Odbc(err.to_string())
    }
}

fn try_extract_structured(err: &odbc_api::Error) -> Option<ExportError> {
    use odbc_api::Error as OdbcErr;
    let record = match err {
        OdbcErr::Diagnostics { record, .. } => record,
        OdbcErr::UnsupportedOdbcApiVersion(record) => record,
        OdbcErr::InvalidRowArraySize { record, .. } => record,
        OdbcErr::UnableToRepresentNull(record) => record,
        OdbcErr::OracleOdbcDriverDoesNotSupport64Bit(record) => record,
        _ => return None,
    };
    Some(structured_from_odbc_record(record))
}

fn structured_from_odbc_record(record: &OdbcRecord) -> ExportError {
    ExportError::Structured {
        sqlstate: record.state.0,
        native_code: record.native_error,
        message: record.to_string(),
    }
}

impl ExportError {
    /// Builds a structured error from a textual SQLSTATE. Used by sinks that
    /// do not go through an ODBC driver.
    pub fn with_sqlstate(sqlstate: &str, message: impl Into<String>) -> Self {
        let mut state = [b'0'; 5];
        for (slot, byte) in state.iter_mut().zip(sqlstate.bytes()) {
            *slot = byte;
        }
        ExportError::Structured {
            sqlstate: state,
            native_code: 0,
            message: message.into(),
        }
    }

    pub fn sqlstate(&self) -> [u8; 5] {
        match self {
            ExportError::Structured { sqlstate, .. } => *sqlstate,
            ExportError::Provisioning { source, .. } => source.sqlstate(),
            _ => [0u8; 5],
        }
    }

    pub fn native_code(&self) -> i32 {
        match self {
            ExportError::Structured { native_code, .. } => *native_code,
            _ => 0,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ExportError::Structured { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }

    /// True for the harmless outcome of losing a concurrent idempotent-create race.
    pub fn is_already_exists(&self) -> bool {
        match self {
            ExportError::Structured { sqlstate, .. } => {
                ALREADY_EXISTS_SQLSTATES.iter().any(|s| *s == sqlstate)
            }
            _ => false,
        }
    }

    /// Returns true if the error is transient and a later export may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::Structured { sqlstate, .. } => {
                // Connection errors (08xxx) and serialization failures (40xxx)
                (sqlstate[0] == b'0' && sqlstate[1] == b'8') || sqlstate[..2] == *b"40"
            }
            ExportError::Pool(_) | ExportError::Timeout(_) => true,
            ExportError::Provisioning { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        match self {
            ExportError::Structured { sqlstate, .. } => sqlstate[0] == b'0' && sqlstate[1] == b'8',
            ExportError::Provisioning { source, .. } => source.is_connection_error(),
            _ => false,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        match self {
            ExportError::Structured { sqlstate, .. } => sqlstate[0] == b'2' && sqlstate[1] == b'3',
            _ => false,
        }
    }

    pub fn error_category(&self) -> ErrorCategory {
        if matches!(
            self,
            ExportError::EmptyConnectionString | ExportError::InvalidConfiguration(_)
        ) {
            return ErrorCategory::Configuration;
        }
        if self.is_connection_error() {
            return ErrorCategory::ConnectionLost;
        }
        if self.is_constraint_violation() {
            return ErrorCategory::Constraint;
        }
        if self.is_retryable() {
            return ErrorCategory::Transient;
        }
        ErrorCategory::Fatal
    }

    pub(crate) fn provisioning(object: impl Into<String>, source: ExportError) -> Self {
        ExportError::Provisioning {
            object: object.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
