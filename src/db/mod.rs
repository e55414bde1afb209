//! Relational backing store built on sqlx.
//!
//! This module provides:
//! - Lazily connected, database-specific connection pools
//! - Transaction sessions with savepoints
//! - The relational transaction manager, database creator and command executor
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod connection;
pub mod creator;
pub mod executor;
pub mod params;
pub mod pool;
pub mod transaction;
pub mod transaction_manager;

pub use connection::RelationalConnection;
pub use creator::RelationalDatabaseCreator;
pub use executor::RelationalCommandExecutor;
pub use pool::DbPool;
pub use transaction::{DbTransaction, RelationalTransaction};
pub use transaction_manager::RelationalTransactionManager;
