//! Log sink contract and its `tracing` adapter.
//!
//! The sink is assumed cheap to query with [`LogSink::is_enabled`] and
//! potentially expensive to write to, so callers check the level before
//! building a message.

use tracing::Level;

/// Target used for every record written through [`TracingLogSink`].
pub const COMMAND_LOG_TARGET: &str = "dbcontext::command";

/// Destination for diagnostic records.
pub trait LogSink: Send + Sync {
    /// Check whether records at `level` would be written.
    fn is_enabled(&self, level: Level) -> bool;

    /// Write a formatted record.
    fn log(&self, level: Level, event_id: i32, message: &str);
}

/// A sink that also knows whether parameter values may be written out.
pub trait SensitiveDataLogger: LogSink {
    fn log_sensitive_data(&self) -> bool;
}

/// Sink that forwards records to the `tracing` dispatcher.
#[derive(Debug, Clone, Default)]
pub struct TracingLogSink {
    log_sensitive_data: bool,
}

impl TracingLogSink {
    pub fn new(log_sensitive_data: bool) -> Self {
        Self { log_sensitive_data }
    }
}

impl LogSink for TracingLogSink {
    fn is_enabled(&self, level: Level) -> bool {
        if level == Level::ERROR {
            tracing::enabled!(target: COMMAND_LOG_TARGET, Level::ERROR)
        } else if level == Level::WARN {
            tracing::enabled!(target: COMMAND_LOG_TARGET, Level::WARN)
        } else if level == Level::INFO {
            tracing::enabled!(target: COMMAND_LOG_TARGET, Level::INFO)
        } else if level == Level::DEBUG {
            tracing::enabled!(target: COMMAND_LOG_TARGET, Level::DEBUG)
        } else {
            tracing::enabled!(target: COMMAND_LOG_TARGET, Level::TRACE)
        }
    }

    // `event!` needs the level as a constant, hence the dispatch
    fn log(&self, level: Level, event_id: i32, message: &str) {
        if level == Level::ERROR {
            tracing::event!(target: COMMAND_LOG_TARGET, Level::ERROR, event_id, "{}", message);
        } else if level == Level::WARN {
            tracing::event!(target: COMMAND_LOG_TARGET, Level::WARN, event_id, "{}", message);
        } else if level == Level::INFO {
            tracing::event!(target: COMMAND_LOG_TARGET, Level::INFO, event_id, "{}", message);
        } else if level == Level::DEBUG {
            tracing::event!(target: COMMAND_LOG_TARGET, Level::DEBUG, event_id, "{}", message);
        } else {
            tracing::event!(target: COMMAND_LOG_TARGET, Level::TRACE, event_id, "{}", message);
        }
    }
}

impl SensitiveDataLogger for TracingLogSink {
    fn log_sensitive_data(&self) -> bool {
        self.log_sensitive_data
    }
}
