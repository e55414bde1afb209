//! Diagnostic formatting of executed commands.
//!
//! Records are only built after the sink confirms the level is enabled, so a
//! disabled logger never enumerates command parameters.

use std::time::Instant;

use tracing::Level;

use super::event_id::RelationalEventId;
use super::sink::{LogSink, SensitiveDataLogger};
use crate::models::{CommandDescription, CommandKind, ParameterValue};

/// Placeholder written instead of a parameter value when sensitive data
/// logging is off.
pub const REDACTED_VALUE: &str = "?";

/// Number of bytes rendered before a binary value is truncated.
pub const MAX_LOGGED_BYTES: usize = 32;

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// A parameter as it appears in a log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LoggedValue {
    Value(ParameterValue),
    Redacted,
}

/// State captured for one executed command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLogData {
    pub command_text: String,
    pub command_kind: CommandKind,
    pub command_timeout: u32,
    pub parameters: Vec<(String, LoggedValue)>,
    pub elapsed_milliseconds: u64,
}

impl CommandLogData {
    /// Capture a command, redacting values unless `log_parameter_values` is set.
    pub fn capture<C: CommandDescription + ?Sized>(
        command: &C,
        log_parameter_values: bool,
        elapsed_milliseconds: u64,
    ) -> Self {
        let parameters = command
            .parameters()
            .iter()
            .map(|p| {
                let value = if log_parameter_values {
                    LoggedValue::Value(p.value.clone())
                } else {
                    LoggedValue::Redacted
                };
                (p.name.clone(), value)
            })
            .collect();

        Self {
            command_text: command.command_text().trim_end().to_string(),
            command_kind: command.command_kind(),
            command_timeout: command.command_timeout(),
            parameters,
            elapsed_milliseconds,
        }
    }

    /// Render the `name='value'` list.
    pub fn format_parameters(&self) -> String {
        self.parameters
            .iter()
            .map(|(name, value)| {
                let rendered = match value {
                    LoggedValue::Value(v) => format_parameter_value(v),
                    LoggedValue::Redacted => REDACTED_VALUE.to_string(),
                };
                format!("{name}='{rendered}'")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn format_message(&self, verb: &str) -> String {
        format!(
            "{} DbCommand ({}ms) [Parameters=[{}], CommandType='{}', CommandTimeout='{}']{}{}",
            verb,
            format_thousands(self.elapsed_milliseconds),
            self.format_parameters(),
            self.command_kind,
            self.command_timeout,
            LINE_ENDING,
            self.command_text
        )
    }
}

/// Log one executed command at INFO.
///
/// `end` must not be earlier than `start`; elapsed time is truncated to whole
/// milliseconds.
pub fn log_command_executed<L, C>(logger: &L, command: &C, start: Instant, end: Instant)
where
    L: SensitiveDataLogger + ?Sized,
    C: CommandDescription + ?Sized,
{
    log_with_state(
        logger,
        Level::INFO,
        RelationalEventId::ExecutedCommand,
        || capture_for(logger, command, start, end),
        |state| state.format_message("Executed"),
    );
}

/// Log a command that failed at ERROR, with the same record layout as
/// [`log_command_executed`].
pub fn log_command_error<L, C>(
    logger: &L,
    command: &C,
    start: Instant,
    end: Instant,
    error: &dyn std::fmt::Display,
) where
    L: SensitiveDataLogger + ?Sized,
    C: CommandDescription + ?Sized,
{
    log_with_state(
        logger,
        Level::ERROR,
        RelationalEventId::CommandError,
        || capture_for(logger, command, start, end),
        |state| format!("{}{}{}", state.format_message("Failed executing"), LINE_ENDING, error),
    );
}

/// Log a message at DEBUG, building it only if DEBUG is enabled.
pub fn log_debug<L, F>(logger: &L, event_id: RelationalEventId, formatter: F)
where
    L: LogSink + ?Sized,
    F: FnOnce() -> String,
{
    if logger.is_enabled(Level::DEBUG) {
        logger.log(Level::DEBUG, event_id.id(), &formatter());
    }
}

/// Log a message at WARN, building it only if WARN is enabled.
pub fn log_warning<L, F>(logger: &L, event_id: RelationalEventId, formatter: F)
where
    L: LogSink + ?Sized,
    F: FnOnce() -> String,
{
    if logger.is_enabled(Level::WARN) {
        logger.log(Level::WARN, event_id.id(), &formatter());
    }
}

fn log_with_state<L, S, B, F>(
    logger: &L,
    level: Level,
    event_id: RelationalEventId,
    state: B,
    formatter: F,
) where
    L: LogSink + ?Sized,
    B: FnOnce() -> S,
    F: FnOnce(&S) -> String,
{
    if logger.is_enabled(level) {
        let state = state();
        logger.log(level, event_id.id(), &formatter(&state));
    }
}

fn capture_for<L, C>(logger: &L, command: &C, start: Instant, end: Instant) -> CommandLogData
where
    L: SensitiveDataLogger + ?Sized,
    C: CommandDescription + ?Sized,
{
    // Short-circuits: the sensitive flag is only read when there is something to reveal
    let log_parameter_values = !command.parameters().is_empty() && logger.log_sensitive_data();
    CommandLogData::capture(command, log_parameter_values, elapsed_milliseconds(start, end))
}

/// Whole milliseconds between two instants, truncated.
pub fn elapsed_milliseconds(start: Instant, end: Instant) -> u64 {
    let millis = end.saturating_duration_since(start).as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Render a parameter value for a log record.
///
/// Binary values are written as `0x` followed by at most 32 bytes of uppercase
/// hex, with `...` appended when truncated. Everything else uses its
/// locale-independent text form; null is the empty string.
pub fn format_parameter_value(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Bytes(bytes) => {
            let shown = &bytes[..bytes.len().min(MAX_LOGGED_BYTES)];
            let mut rendered = String::with_capacity(2 + shown.len() * 2 + 3);
            rendered.push_str("0x");
            rendered.push_str(&hex::encode_upper(shown));
            if bytes.len() > MAX_LOGGED_BYTES {
                rendered.push_str("...");
            }
            rendered
        }
        ParameterValue::Null => String::new(),
        ParameterValue::Bool(b) => b.to_string(),
        ParameterValue::Int(i) => i.to_string(),
        ParameterValue::Float(f) => format_float(*f),
        ParameterValue::String(s) => s.clone(),
        ParameterValue::Json(json) => {
            serde_json::to_string(json).unwrap_or_else(|_| REDACTED_VALUE.to_string())
        }
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        value.to_string()
    }
}

/// Format an integer with `,` thousands separators.
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
