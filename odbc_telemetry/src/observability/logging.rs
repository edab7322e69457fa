use crate::error::ExportError;
use log::Level;

/// Exporter diagnostics on top of the `log` facade. Nothing is printed
/// until the host installs a logger backend; a disabled instance is silent
/// even then.
#[derive(Debug, Clone, Copy)]
pub struct StructuredLogger {
    enabled: bool,
}

impl StructuredLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_export(&self, kind: &str, count: usize) {
        if !self.enabled {
            return;
        }

        log::debug!("{} {} records exported", count, kind);
    }

    pub fn log_export_failure(&self, kind: &str, error: &ExportError) {
        if !self.enabled {
            return;
        }

        let mut message = format!("{} export failed: {}", kind, error);
        let sqlstate = error.sqlstate();
        if sqlstate != [0u8; 5] {
            message.push_str(&format!(", sqlstate={}", String::from_utf8_lossy(&sqlstate)));
        }
        message.push_str(&format!(", category={:?}", error.error_category()));

        log::error!("{}", message);
    }

    pub fn log_provisioned(&self, schema: &str) {
        if !self.enabled {
            return;
        }

        log::debug!("Schema {} provisioned", schema);
    }

    pub fn log_lifecycle(&self, level: Level, exporter: &str, action: &str) {
        if !self.enabled {
            return;
        }

        log::log!(level, "{} {}", exporter, action);
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(true)
    }
}
