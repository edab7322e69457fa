pub mod param_value;

pub use param_value::{format_timestamp, to_input_parameters, ParamValue};
