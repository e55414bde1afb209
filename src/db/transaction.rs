//! Relational transaction sessions.
//!
//! A [`RelationalTransaction`] owns one sqlx transaction (and so one pooled
//! connection) from begin until commit, rollback or discard.

use crate::db::params::{mysql_query, postgres_query, sqlite_query};
use crate::error::{DbError, DbResult};
use crate::logging::{RelationalEventId, SensitiveDataLogger, log_debug};
use crate::models::{DatabaseType, DbCommand, TransactionState};
use crate::storage::{DbContextTransaction, cancellable, validate_savepoint_name};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbTransaction::MySql(_) => DatabaseType::MySQL,
            DbTransaction::Postgres(_) => DatabaseType::PostgreSQL,
            DbTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => tx.commit().await.map_err(DbError::from),
            Postgres(tx) => tx.commit().await.map_err(DbError::from),
            SQLite(tx) => tx.commit().await.map_err(DbError::from),
        })
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => tx.rollback().await.map_err(DbError::from),
            Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            SQLite(tx) => tx.rollback().await.map_err(DbError::from),
        })
    }

    /// Execute a command inside the transaction and return rows affected.
    pub async fn execute(&mut self, command: &DbCommand) -> DbResult<u64> {
        if command.parameters.is_empty() {
            return self.execute_raw(&command.text).await;
        }
        let rows_affected = impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => mysql_query(command).execute(&mut **tx).await?.rows_affected(),
            Postgres(tx) => postgres_query(command).execute(&mut **tx).await?.rows_affected(),
            SQLite(tx) => sqlite_query(command).execute(&mut **tx).await?.rows_affected(),
        });
        Ok(rows_affected)
    }

    /// Execute an unprepared statement and return rows affected.
    async fn execute_raw(&mut self, sql: &str) -> DbResult<u64> {
        let rows_affected = impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => sqlx::Executor::execute(&mut **tx, sqlx::raw_sql(sql)).await?.rows_affected(),
            Postgres(tx) => sqlx::Executor::execute(&mut **tx, sqlx::raw_sql(sql)).await?.rows_affected(),
            SQLite(tx) => sqlx::Executor::execute(&mut **tx, sqlx::raw_sql(sql)).await?.rows_affected(),
        });
        Ok(rows_affected)
    }
}

/// One relational transaction session.
pub struct RelationalTransaction {
    id: Uuid,
    db_type: DatabaseType,
    started_at: DateTime<Utc>,
    supports_savepoints: bool,
    /// `None` once the session has ended
    inner: tokio::sync::Mutex<Option<DbTransaction>>,
    state: Mutex<TransactionState>,
    savepoints: Mutex<Vec<String>>,
    logger: Arc<dyn SensitiveDataLogger>,
}

impl RelationalTransaction {
    pub(crate) fn new(
        transaction: DbTransaction,
        supports_savepoints: bool,
        logger: Arc<dyn SensitiveDataLogger>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            db_type: transaction.db_type(),
            started_at: Utc::now(),
            supports_savepoints,
            inner: tokio::sync::Mutex::new(Some(transaction)),
            state: Mutex::new(TransactionState::Active),
            savepoints: Mutex::new(Vec::new()),
            logger,
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Execute a command inside this session.
    pub async fn execute(&self, command: &DbCommand) -> DbResult<u64> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(|| self.ended_error("execute a command"))?;
        tx.execute(command).await
    }

    /// End the session without waiting for the server.
    ///
    /// The connection rolls back when it is returned to the pool. Returns
    /// `false` if the session had already ended or is busy on another task.
    pub(crate) fn discard(&self) -> bool {
        let Ok(mut guard) = self.inner.try_lock() else {
            warn!(transaction_id = %self.id, "Transaction busy, leaving it to finish");
            return false;
        };
        match guard.take() {
            Some(tx) => {
                drop(tx);
                self.finish(TransactionState::RolledBack);
                debug!(transaction_id = %self.id, "Transaction discarded");
                true
            }
            None => false,
        }
    }

    fn finish(&self, state: TransactionState) {
        *self.state.lock() = state;
        self.savepoints.lock().clear();
    }

    fn ended_error(&self, operation: &str) -> DbError {
        DbError::transaction(
            format!(
                "Cannot {operation}: the transaction has already {}",
                *self.state.lock()
            ),
            Some(self.id.to_string()),
        )
    }

    fn ensure_savepoints_supported(&self, operation: &str) -> DbResult<()> {
        if self.supports_savepoints {
            Ok(())
        } else {
            Err(DbError::not_supported(operation, self.db_type.display_name()))
        }
    }

    fn savepoint_position(&self, name: &str) -> DbResult<usize> {
        self.savepoints
            .lock()
            .iter()
            .rposition(|s| s == name)
            .ok_or_else(|| DbError::savepoint("No savepoint with this name exists", name))
    }

    /// Wait for the session, giving up if `cancel` fires first.
    ///
    /// Cancellation stops here: a savepoint statement that has been sent
    /// always completes, so the savepoint stack matches the server.
    async fn lock_session(
        &self,
        cancel: &CancellationToken,
        operation: &str,
    ) -> DbResult<tokio::sync::MutexGuard<'_, Option<DbTransaction>>> {
        cancellable(cancel, operation, async { Ok(self.inner.lock().await) }).await
    }

    /// Take the sqlx transaction out, leaving the session ended.
    async fn take(&self, operation: &str) -> DbResult<DbTransaction> {
        let mut guard = self.inner.lock().await;
        guard.take().ok_or_else(|| self.ended_error(operation))
    }
}

impl std::fmt::Debug for RelationalTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalTransaction")
            .field("id", &self.id)
            .field("db_type", &self.db_type)
            .field("started_at", &self.started_at)
            .field("state", &*self.state.lock())
            .field("savepoints", &*self.savepoints.lock())
            .finish()
    }
}

#[async_trait]
impl DbContextTransaction for RelationalTransaction {
    fn transaction_id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn supports_savepoints(&self) -> bool {
        self.supports_savepoints
    }

    fn savepoints(&self) -> Vec<String> {
        self.savepoints.lock().clone()
    }

    /// Cancellation is observed before the commit is sent.
    async fn commit(&self, cancel: &CancellationToken) -> DbResult<()> {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("commit transaction"));
        }
        let tx = self.take("commit").await?;
        log_debug(&*self.logger, RelationalEventId::CommittingTransaction, || {
            format!("Committing transaction {}.", self.id)
        });
        match tx.commit().await {
            Ok(()) => {
                self.finish(TransactionState::Committed);
                info!(transaction_id = %self.id, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                // A failed commit leaves nothing to commit or roll back
                self.finish(TransactionState::RolledBack);
                Err(e)
            }
        }
    }

    /// Cancellation is observed before the rollback is sent.
    async fn rollback(&self, cancel: &CancellationToken) -> DbResult<()> {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("rollback transaction"));
        }
        let tx = self.take("roll back").await?;
        log_debug(&*self.logger, RelationalEventId::RollingbackTransaction, || {
            format!("Rolling back transaction {}.", self.id)
        });
        let result = tx.rollback().await;
        self.finish(TransactionState::RolledBack);
        info!(transaction_id = %self.id, "Transaction rolled back");
        result
    }

    async fn create_savepoint(&self, name: &str, cancel: &CancellationToken) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.ensure_savepoints_supported("create savepoint")?;
        let mut guard = self.lock_session(cancel, "create savepoint").await?;
        let tx = guard
            .as_mut()
            .ok_or_else(|| self.ended_error("create a savepoint"))?;
        log_debug(&*self.logger, RelationalEventId::CreatingSavepoint, || {
            format!("Creating savepoint '{name}' on transaction {}.", self.id)
        });
        tx.execute_raw(&format!("SAVEPOINT {name}")).await?;
        self.savepoints.lock().push(name.to_string());
        Ok(())
    }

    async fn rollback_to_savepoint(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.ensure_savepoints_supported("rollback to savepoint")?;
        let mut guard = self.lock_session(cancel, "rollback to savepoint").await?;
        let tx = guard
            .as_mut()
            .ok_or_else(|| self.ended_error("roll back to a savepoint"))?;
        let position = self.savepoint_position(name)?;
        log_debug(&*self.logger, RelationalEventId::RollingbackToSavepoint, || {
            format!("Rolling back to savepoint '{name}' on transaction {}.", self.id)
        });
        tx.execute_raw(&format!("ROLLBACK TO SAVEPOINT {name}")).await?;
        // The savepoint itself survives a rollback to it
        self.savepoints.lock().truncate(position + 1);
        Ok(())
    }

    async fn release_savepoint(&self, name: &str, cancel: &CancellationToken) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.ensure_savepoints_supported("release savepoint")?;
        let mut guard = self.lock_session(cancel, "release savepoint").await?;
        let tx = guard
            .as_mut()
            .ok_or_else(|| self.ended_error("release a savepoint"))?;
        let position = self.savepoint_position(name)?;
        log_debug(&*self.logger, RelationalEventId::ReleasingSavepoint, || {
            format!("Releasing savepoint '{name}' on transaction {}.", self.id)
        });
        tx.execute_raw(&format!("RELEASE SAVEPOINT {name}")).await?;
        self.savepoints.lock().truncate(position);
        Ok(())
    }
}
