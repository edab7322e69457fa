/// Helper functions for E2E tests.
/// Provides utilities to check whether E2E tests can run (connection available).
use super::env::get_test_dsn;
use odbc_telemetry::test_helpers::load_dotenv;
use odbc_telemetry::{OdbcSink, Sink};
use std::time::Duration;

/// Checks whether a connection to the test DSN can be established.
#[allow(dead_code)]
pub fn can_connect_to_sink() -> bool {
    load_dotenv();

    let conn_str = match get_test_dsn() {
        Some(s) => s,
        None => {
            eprintln!("[WARN] TELEMETRY_TEST_DSN not set");
            return false;
        }
    };

    let sink = match OdbcSink::new(&conn_str, 1, Duration::from_secs(5)) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("[ERROR] Invalid connection string: {}", e);
            return false;
        }
    };

    let connected = match sink.connect() {
        Ok(_) => true,
        Err(e) => {
            eprintln!("[ERROR] Connection failed: {}", e);
            false
        }
    };
    connected
}

/// Checks whether E2E tests should run.
/// Runs only when ENABLE_E2E_TESTS is explicitly enabled.
#[allow(dead_code)]
pub fn should_run_e2e_tests() -> bool {
    load_dotenv();

    fn parse_env_bool(raw: &str) -> Option<bool> {
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "y" => Some(true),
            "0" | "false" | "no" | "n" => Some(false),
            _ => None,
        }
    }

    let enabled = std::env::var("ENABLE_E2E_TESTS")
        .ok()
        .as_deref()
        .and_then(parse_env_bool)
        == Some(true);

    if !enabled {
        return false;
    }

    can_connect_to_sink()
}
