//! In-memory backing store, used when a context is built without a database.

pub mod creator;
pub mod transaction_manager;

pub use creator::InMemoryDatabaseCreator;
pub use transaction_manager::{IN_MEMORY_PROVIDER, InMemoryTransaction, InMemoryTransactionManager};
