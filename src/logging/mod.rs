//! Diagnostic logging.
//!
//! This module provides:
//! - The [`LogSink`] contract and a `tracing`-backed implementation
//! - Numeric event identifiers for every record
//! - Executed-command formatting with sensitive data redaction

pub mod command;
pub mod event_id;
pub mod sink;

pub use command::{
    CommandLogData, LoggedValue, format_parameter_value, log_command_error, log_command_executed,
    log_debug, log_warning,
};
pub use event_id::RelationalEventId;
pub use sink::{COMMAND_LOG_TARGET, LogSink, SensitiveDataLogger, TracingLogSink};
