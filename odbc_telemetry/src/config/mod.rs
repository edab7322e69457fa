use crate::error::{ExportError, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_SCHEMA_NAME: &str = "telemetry";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_EXPORT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

/// PostgreSQL truncates identifiers beyond this length.
const MAX_IDENTIFIER_LEN: usize = 63;

const ENV_CONNECTION_STRING: &str = "TELEMETRY_CONNECTION_STRING";
const ENV_SCHEMA: &str = "TELEMETRY_SCHEMA";
const ENV_AUTO_CREATE_TABLES: &str = "TELEMETRY_AUTO_CREATE_TABLES";
const ENV_BATCH_SIZE: &str = "TELEMETRY_BATCH_SIZE";
const ENV_EXPORT_TIMEOUT_MS: &str = "TELEMETRY_EXPORT_TIMEOUT_MS";
const ENV_POOL_SIZE: &str = "TELEMETRY_POOL_SIZE";

/// Settings shared by every exporter. Read-only once an exporter holds them.
///
/// `batch_size` and `export_timeout_ms` are hints: batches of any size are
/// accepted, and the timeout bounds a single export attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExporterOptions {
    pub connection_string: String,
    pub schema_name: String,
    pub auto_create_tables: bool,
    pub batch_size: usize,
    pub export_timeout_ms: u64,
    pub max_pool_size: u32,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
            auto_create_tables: true,
            batch_size: DEFAULT_BATCH_SIZE,
            export_timeout_ms: DEFAULT_EXPORT_TIMEOUT_MS,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
        }
    }
}

impl ExporterOptions {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    pub fn with_auto_create_tables(mut self, enabled: bool) -> Self {
        self.auto_create_tables = enabled;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_export_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.export_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_pool_size(mut self, max_pool_size: u32) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    /// Reads options from `TELEMETRY_*` variables, falling back to defaults
    /// for everything except the connection string.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::new(lookup(ENV_CONNECTION_STRING).unwrap_or_default());

        if let Some(schema) = lookup(ENV_SCHEMA).filter(|s| !s.trim().is_empty()) {
            options.schema_name = schema.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_AUTO_CREATE_TABLES) {
            options.auto_create_tables = parse_bool_flag(&raw).ok_or_else(|| {
                ExportError::InvalidConfiguration(format!(
                    "{} must be a boolean, got '{}'",
                    ENV_AUTO_CREATE_TABLES, raw
                ))
            })?;
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            options.batch_size = parse_number(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_EXPORT_TIMEOUT_MS) {
            options.export_timeout_ms = parse_number(ENV_EXPORT_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            options.max_pool_size = parse_number(ENV_POOL_SIZE, &raw)?;
        }

        Ok(options)
    }

    /// Checks the options without touching the sink.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(ExportError::EmptyConnectionString);
        }
        validate_identifier(&self.schema_name)?;
        if self.export_timeout_ms == 0 {
            return Err(ExportError::InvalidConfiguration(
                "export_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_pool_size == 0 {
            return Err(ExportError::InvalidConfiguration(
                "max_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }
}

/// The schema name is the only value spliced into SQL text, so it is held
/// to a plain unquoted identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(ExportError::InvalidConfiguration(format!(
            "'{}' is not a valid schema name",
            name
        )));
    }
    Ok(())
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        ExportError::InvalidConfiguration(format!("{} must be a number, got '{}'", key, raw))
    })
}
