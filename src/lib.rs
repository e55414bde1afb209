//! dbcontext library
//!
//! A unit-of-work context over SQL databases (SQLite, PostgreSQL, MySQL) or an
//! in-memory store. The context exposes transaction, savepoint and database
//! lifecycle operations through [`DatabaseFacade`], and logs every executed
//! command through a pluggable sink.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod facade;
pub mod in_memory;
pub mod logging;
pub mod models;
pub mod storage;

pub use config::{Config, ContextOptions};
pub use context::{DbContext, DbContextBuilder};
pub use error::{DbError, DbResult};
pub use facade::DatabaseFacade;
pub use storage::{
    CommandExecutor, DatabaseCreator, DbContextTransaction, TransactionManager,
    TransactionMetadata,
};
