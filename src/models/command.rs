//! Command-related data models.
//!
//! This module defines the commands handed to the execution pipeline and the
//! parameter values bound to them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u32 = 30;

/// Maximum command timeout in seconds.
pub const MAX_COMMAND_TIMEOUT_SECS: u32 = 3600;

/// A parameter value bound to a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// JSON document
    Json(JsonValue),
}

impl ParameterValue {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    /// Parse a value written on the command line.
    ///
    /// `null`, `true`/`false`, integers and floats map to their typed variants,
    /// `0x`-prefixed hex maps to bytes, `{...}`/`[...]` to JSON, and anything
    /// else is taken as a string. Wrap a value in double quotes to force a string.
    pub fn parse_literal(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if let Ok(b) = trimmed.parse::<bool>() {
            return Self::Bool(b);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        if let Some(hex_digits) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            if let Ok(bytes) = hex::decode(hex_digits) {
                return Self::Bytes(bytes);
            }
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(json) = serde_json::from_str(trimmed) {
                return Self::Json(json);
            }
        }
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            return Self::String(trimmed[1..trimmed.len() - 1].to_string());
        }
        Self::String(raw.to_string())
    }
}

/// A named parameter of a command.
///
/// Parameters are bound positionally in declaration order; the name is used
/// for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbParameter {
    pub name: String,
    pub value: ParameterValue,
}

impl DbParameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Parse a `name=value` pair.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (name, raw) = s
            .split_once('=')
            .ok_or_else(|| format!("Invalid parameter '{s}': expected name=value"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("Invalid parameter '{s}': name cannot be empty"));
        }
        Ok(Self::new(name, ParameterValue::parse_literal(raw)))
    }
}

/// How the command text is interpreted by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
    TableDirect,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "Text"),
            Self::StoredProcedure => write!(f, "StoredProcedure"),
            Self::TableDirect => write!(f, "TableDirect"),
        }
    }
}

/// Read access to a command as seen by the command logger.
///
/// The logger only calls [`parameters`](Self::parameters) when it is going to
/// emit a record, so implementations may compute parameters lazily.
pub trait CommandDescription {
    fn command_text(&self) -> &str;
    fn command_kind(&self) -> CommandKind;
    /// Timeout in whole seconds; 0 means no timeout.
    fn command_timeout(&self) -> u32;
    fn parameters(&self) -> &[DbParameter];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbCommand {
    pub text: String,
    #[serde(default)]
    pub kind: CommandKind,
    /// Default: 30, max: 3600, 0 disables the timeout
    pub timeout_secs: u32,
    #[serde(default)]
    pub parameters: Vec<DbParameter>,
}

impl DbCommand {
    /// Create a new text command with the default timeout.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::Text,
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            parameters: Vec::new(),
        }
    }

    /// Add a parameter to this command.
    pub fn with_parameter(mut self, name: impl Into<String>, value: ParameterValue) -> Self {
        self.parameters.push(DbParameter::new(name, value));
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = DbParameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the timeout (clamped to the maximum).
    pub fn with_timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = timeout_secs.min(MAX_COMMAND_TIMEOUT_SECS);
        self
    }
}

impl CommandDescription for DbCommand {
    fn command_text(&self) -> &str {
        &self.text
    }

    fn command_kind(&self) -> CommandKind {
        self.kind
    }

    fn command_timeout(&self) -> u32 {
        self.timeout_secs
    }

    fn parameters(&self) -> &[DbParameter] {
        &self.parameters
    }
}
