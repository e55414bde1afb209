//! Connection state shared by the relational services of one context.

use crate::db::pool::DbPool;
use crate::db::transaction::RelationalTransaction;
use crate::error::{DbError, DbResult};
use crate::logging::{RelationalEventId, SensitiveDataLogger, log_debug};
use crate::models::{ConnectionConfig, DatabaseType};
use crate::storage::DbContextTransaction;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::info;

/// Lazily connected pool plus the context's current transaction.
pub struct RelationalConnection {
    pool: RwLock<DbPool>,
    config: ConnectionConfig,
    logger: Arc<dyn SensitiveDataLogger>,
    runtime: Handle,
    current_transaction: Mutex<Option<Arc<RelationalTransaction>>>,
    server_version: RwLock<Option<String>>,
}

impl RelationalConnection {
    /// Create the connection state; no connection is opened yet.
    ///
    /// Must be called from within a Tokio runtime, which is also the runtime
    /// the blocking API drives.
    pub fn new(config: ConnectionConfig, logger: Arc<dyn SensitiveDataLogger>) -> DbResult<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            DbError::internal("A relational context must be created inside a Tokio runtime")
        })?;
        let pool = DbPool::connect_lazy(&config)?;
        info!(
            db_type = %config.db_type,
            connection = %config.masked_connection_string(),
            "Created lazy connection pool"
        );
        Ok(Self {
            pool: RwLock::new(pool),
            config,
            logger,
            runtime,
            current_transaction: Mutex::new(None),
            server_version: RwLock::new(None),
        })
    }

    pub fn pool(&self) -> DbPool {
        self.pool.read().clone()
    }

    /// Swap in a fresh lazy pool and close the old one.
    ///
    /// Used before dropping a database, which fails or leaves dangling
    /// connections while pooled connections remain open.
    pub async fn reset_pool(&self) -> DbResult<()> {
        let fresh = DbPool::connect_lazy(&self.config)?;
        let old = std::mem::replace(&mut *self.pool.write(), fresh);
        old.close().await;
        *self.server_version.write() = None;
        Ok(())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn db_type(&self) -> DatabaseType {
        self.config.db_type
    }

    pub fn logger(&self) -> &Arc<dyn SensitiveDataLogger> {
        &self.logger
    }

    /// The open transaction, if any. Ended transactions are cleared.
    pub fn current_transaction(&self) -> Option<Arc<RelationalTransaction>> {
        let mut current = self.current_transaction.lock();
        if current.as_ref().is_some_and(|tx| tx.state().is_ended()) {
            *current = None;
        }
        current.clone()
    }

    pub(crate) fn set_current_transaction(&self, transaction: Option<Arc<RelationalTransaction>>) {
        *self.current_transaction.lock() = transaction;
    }

    /// Take the current transaction, leaving none.
    pub(crate) fn take_current_transaction(&self) -> Option<Arc<RelationalTransaction>> {
        self.current_transaction.lock().take()
    }

    /// Server version as last reported, without querying.
    pub fn cached_server_version(&self) -> Option<String> {
        self.server_version.read().clone()
    }

    /// Server version, queried once and then cached.
    pub async fn server_version(&self) -> Option<String> {
        if let Some(version) = self.cached_server_version() {
            return Some(version);
        }
        log_debug(&*self.logger, RelationalEventId::OpeningConnection, || {
            format!(
                "Opening connection to {} database.",
                self.config.db_type.display_name()
            )
        });
        let version = self.pool().server_version().await?;
        *self.server_version.write() = Some(version.clone());
        Some(version)
    }

    /// Whether the server supports savepoints, as far as is known.
    pub fn supports_savepoints(&self) -> bool {
        self.db_type()
            .supports_savepoints(self.cached_server_version().as_deref())
    }

    /// Drive `future` to completion from synchronous code.
    ///
    /// Works outside any runtime and on multi-thread runtime workers; a
    /// current-thread runtime cannot be blocked and yields an error.
    pub fn block_on<F: Future>(&self, future: F) -> DbResult<F::Output> {
        match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                Err(DbError::not_supported(
                    "blocking call from a current-thread Tokio runtime; use the async API",
                    self.db_type().display_name(),
                ))
            }
            Ok(_) => Ok(tokio::task::block_in_place(|| self.runtime.block_on(future))),
            Err(_) => Ok(self.runtime.block_on(future)),
        }
    }

    /// Enter the runtime the connection was created on.
    ///
    /// Returning a connection to the pool spawns a task, so synchronous code
    /// that may drop a transaction holds this guard.
    pub(crate) fn enter_runtime(&self) -> tokio::runtime::EnterGuard<'_> {
        self.runtime.enter()
    }

    /// Close the pool. Any open transaction rolls back as its connection closes.
    pub async fn close(&self) {
        log_debug(&*self.logger, RelationalEventId::ClosingConnection, || {
            format!(
                "Closing connection to {} database.",
                self.config.db_type.display_name()
            )
        });
        self.pool().close().await;
    }
}

impl std::fmt::Debug for RelationalConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalConnection")
            .field("db_type", &self.config.db_type)
            .field("connection", &self.config.masked_connection_string())
            .field("server_version", &*self.server_version.read())
            .field("has_transaction", &self.current_transaction.lock().is_some())
            .finish()
    }
}
