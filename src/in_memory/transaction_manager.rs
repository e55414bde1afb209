//! Transaction manager for the in-memory store.
//!
//! The in-memory store applies changes immediately, so transactions only move
//! through their states. Each step logs a `TransactionIgnored` warning.

use crate::error::{DbError, DbResult};
use crate::logging::{RelationalEventId, SensitiveDataLogger, log_warning};
use crate::models::TransactionState;
use crate::storage::{DbContextTransaction, TransactionManager};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Provider name reported by in-memory services.
pub const IN_MEMORY_PROVIDER: &str = "InMemory";

const TRANSACTIONS_IGNORED: &str =
    "Transactions are not supported by the in-memory store and are ignored.";

/// A transaction handle that has no effect on stored data.
#[derive(Debug)]
pub struct InMemoryTransaction {
    id: Uuid,
    started_at: DateTime<Utc>,
    state: Mutex<TransactionState>,
}

impl InMemoryTransaction {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: Mutex::new(TransactionState::Active),
        }
    }

    fn end(&self, state: TransactionState, operation: &str) -> DbResult<()> {
        let mut current = self.state.lock();
        if current.is_ended() {
            return Err(DbError::transaction(
                format!("Cannot {operation}: the transaction has already {}", *current),
                Some(self.id.to_string()),
            ));
        }
        *current = state;
        Ok(())
    }
}

#[async_trait]
impl DbContextTransaction for InMemoryTransaction {
    fn transaction_id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    async fn commit(&self, cancel: &CancellationToken) -> DbResult<()> {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("commit transaction"));
        }
        self.end(TransactionState::Committed, "commit")
    }

    async fn rollback(&self, cancel: &CancellationToken) -> DbResult<()> {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("rollback transaction"));
        }
        self.end(TransactionState::RolledBack, "roll back")
    }
}

/// Tracks the current in-memory transaction of one context.
pub struct InMemoryTransactionManager {
    current: Mutex<Option<Arc<InMemoryTransaction>>>,
    logger: Arc<dyn SensitiveDataLogger>,
}

impl InMemoryTransactionManager {
    pub fn new(logger: Arc<dyn SensitiveDataLogger>) -> Self {
        Self {
            current: Mutex::new(None),
            logger,
        }
    }

    fn warn_ignored(&self) {
        log_warning(&*self.logger, RelationalEventId::TransactionIgnored, || {
            TRANSACTIONS_IGNORED.to_string()
        });
    }

    fn begin(&self, cancel: &CancellationToken) -> DbResult<Arc<dyn DbContextTransaction>> {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("begin transaction"));
        }
        let mut current = self.current.lock();
        if let Some(active) = current.as_ref().filter(|tx| tx.state().is_active()) {
            return Err(DbError::transaction(
                "A transaction is already in progress; commit or roll it back first",
                Some(active.id.to_string()),
            ));
        }
        self.warn_ignored();
        let transaction = Arc::new(InMemoryTransaction::new());
        *current = Some(Arc::clone(&transaction));
        Ok(transaction)
    }

    fn finish(
        &self,
        state: TransactionState,
        operation: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled(format!("{operation} transaction")));
        }
        let transaction = self
            .current
            .lock()
            .take()
            .filter(|tx| tx.state().is_active())
            .ok_or_else(|| DbError::no_transaction(operation))?;
        self.warn_ignored();
        transaction.end(state, operation)
    }

    fn savepoints_not_supported(&self, operation: &str) -> DbResult<()> {
        Err(DbError::not_supported(operation, IN_MEMORY_PROVIDER))
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    fn begin_transaction(&self) -> DbResult<Arc<dyn DbContextTransaction>> {
        self.begin(&CancellationToken::new())
    }

    async fn begin_transaction_async(
        &self,
        cancel: &CancellationToken,
    ) -> DbResult<Arc<dyn DbContextTransaction>> {
        self.begin(cancel)
    }

    fn commit_transaction(&self) -> DbResult<()> {
        self.finish(TransactionState::Committed, "commit", &CancellationToken::new())
    }

    async fn commit_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()> {
        self.finish(TransactionState::Committed, "commit", cancel)
    }

    fn rollback_transaction(&self) -> DbResult<()> {
        self.finish(TransactionState::RolledBack, "roll back", &CancellationToken::new())
    }

    async fn rollback_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()> {
        self.finish(TransactionState::RolledBack, "roll back", cancel)
    }

    fn create_savepoint(&self, _name: &str) -> DbResult<()> {
        self.savepoints_not_supported("create savepoint")
    }

    async fn create_savepoint_async(
        &self,
        _name: &str,
        _cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.savepoints_not_supported("create savepoint")
    }

    fn rollback_to_savepoint(&self, _name: &str) -> DbResult<()> {
        self.savepoints_not_supported("rollback to savepoint")
    }

    async fn rollback_to_savepoint_async(
        &self,
        _name: &str,
        _cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.savepoints_not_supported("rollback to savepoint")
    }

    fn release_savepoint(&self, _name: &str) -> DbResult<()> {
        self.savepoints_not_supported("release savepoint")
    }

    async fn release_savepoint_async(
        &self,
        _name: &str,
        _cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.savepoints_not_supported("release savepoint")
    }

    fn are_savepoints_supported(&self) -> bool {
        false
    }

    fn current_transaction(&self) -> Option<Arc<dyn DbContextTransaction>> {
        let current = self.current.lock();
        current
            .as_ref()
            .filter(|tx| tx.state().is_active())
            .map(|tx| Arc::clone(tx) as Arc<dyn DbContextTransaction>)
    }

    fn reset_state(&self) {
        if let Some(transaction) = self.current.lock().take() {
            // Nothing was applied through the transaction, so there is nothing to undo
            let _ = transaction.end(TransactionState::RolledBack, "reset");
        }
    }

    async fn reset_state_async(&self) -> DbResult<()> {
        self.reset_state();
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryTransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransactionManager")
            .field("current", &*self.current.lock())
            .finish()
    }
}
