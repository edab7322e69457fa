//! Helper functions for reading environment variables in tests

/// Get the TELEMETRY_TEST_DSN connection string from environment
/// Returns None if not set (tests should be skipped in this case)
pub fn get_test_dsn() -> Option<String> {
    std::env::var("TELEMETRY_TEST_DSN")
        .ok()
        .filter(|s| !s.is_empty())
}

/// Schema name that does not collide with earlier runs against the same
/// database.
#[allow(dead_code)]
pub fn unique_schema_name(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!(
        "{}_{}_{}",
        prefix,
        std::process::id(),
        nanos % 1_000_000_000
    )
}
