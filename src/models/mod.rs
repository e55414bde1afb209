//! Data models for dbcontext.
//!
//! This module re-exports all model types used throughout the crate.

pub mod command;
pub mod connection;

// Re-export commonly used types
pub use command::{
    CommandDescription, CommandKind, DEFAULT_COMMAND_TIMEOUT_SECS, DbCommand, DbParameter,
    MAX_COMMAND_TIMEOUT_SECS, ParameterValue,
};
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType, TransactionState};
