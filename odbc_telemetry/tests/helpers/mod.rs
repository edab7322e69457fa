pub mod e2e;
pub mod env;
pub mod records;

#[allow(unused_imports)]
pub use e2e::{can_connect_to_sink, should_run_e2e_tests};
#[allow(unused_imports)]
pub use env::{get_test_dsn, unique_schema_name};
#[allow(unused_imports)]
pub use records::{log_record, memory_exporter, metric_record, span_record};
