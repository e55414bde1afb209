//! Transaction manager for relational databases.

use crate::db::connection::RelationalConnection;
use crate::db::transaction::RelationalTransaction;
use crate::error::{DbError, DbResult};
use crate::logging::{RelationalEventId, log_debug};
use crate::storage::{DbContextTransaction, TransactionManager, cancellable};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs at most one transaction at a time on a [`RelationalConnection`].
#[derive(Debug)]
pub struct RelationalTransactionManager {
    connection: Arc<RelationalConnection>,
}

impl RelationalTransactionManager {
    pub fn new(connection: Arc<RelationalConnection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<RelationalConnection> {
        &self.connection
    }

    fn require_current(&self, operation: &str) -> DbResult<Arc<RelationalTransaction>> {
        self.connection
            .current_transaction()
            .ok_or_else(|| DbError::no_transaction(operation))
    }

    async fn begin(&self, cancel: &CancellationToken) -> DbResult<Arc<RelationalTransaction>> {
        if let Some(current) = self.connection.current_transaction() {
            return Err(DbError::transaction(
                "A transaction is already in progress; commit or roll it back first",
                Some(current.transaction_id().to_string()),
            ));
        }

        cancellable(cancel, "begin transaction", async {
            log_debug(
                &**self.connection.logger(),
                RelationalEventId::BeginningTransaction,
                || "Beginning transaction.".to_string(),
            );
            // Resolved before BEGIN: a single-connection pool has nothing spare afterwards
            self.connection.server_version().await;
            let tx = self.connection.pool().begin().await?;
            let transaction = Arc::new(RelationalTransaction::new(
                tx,
                self.connection.supports_savepoints(),
                Arc::clone(self.connection.logger()),
            ));
            self.connection
                .set_current_transaction(Some(Arc::clone(&transaction)));
            info!(
                transaction_id = %transaction.transaction_id(),
                db_type = %transaction.db_type(),
                "Transaction started"
            );
            Ok::<_, DbError>(transaction)
        })
        .await
    }

    async fn commit(&self, cancel: &CancellationToken) -> DbResult<()> {
        let transaction = self.require_current("commit")?;
        let result = transaction.commit(cancel).await;
        self.clear_if_ended(&transaction);
        result
    }

    async fn rollback(&self, cancel: &CancellationToken) -> DbResult<()> {
        let transaction = self.require_current("roll back")?;
        let result = transaction.rollback(cancel).await;
        self.clear_if_ended(&transaction);
        result
    }

    fn clear_if_ended(&self, transaction: &Arc<RelationalTransaction>) {
        if transaction.state().is_ended() {
            let current = self.connection.take_current_transaction();
            // Keep a newer transaction begun concurrently
            if let Some(other) = current.filter(|c| !Arc::ptr_eq(c, transaction)) {
                self.connection.set_current_transaction(Some(other));
            }
        }
    }
}

#[async_trait]
impl TransactionManager for RelationalTransactionManager {
    fn begin_transaction(&self) -> DbResult<Arc<dyn DbContextTransaction>> {
        self.connection
            .block_on(self.begin_transaction_async(&CancellationToken::new()))?
    }

    async fn begin_transaction_async(
        &self,
        cancel: &CancellationToken,
    ) -> DbResult<Arc<dyn DbContextTransaction>> {
        let transaction: Arc<dyn DbContextTransaction> = self.begin(cancel).await?;
        Ok(transaction)
    }

    fn commit_transaction(&self) -> DbResult<()> {
        self.connection
            .block_on(self.commit(&CancellationToken::new()))?
    }

    async fn commit_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()> {
        self.commit(cancel).await
    }

    fn rollback_transaction(&self) -> DbResult<()> {
        self.connection
            .block_on(self.rollback(&CancellationToken::new()))?
    }

    async fn rollback_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()> {
        self.rollback(cancel).await
    }

    fn create_savepoint(&self, name: &str) -> DbResult<()> {
        self.connection
            .block_on(self.create_savepoint_async(name, &CancellationToken::new()))?
    }

    async fn create_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        let transaction = self.require_current("create a savepoint")?;
        transaction.create_savepoint(name, cancel).await
    }

    fn rollback_to_savepoint(&self, name: &str) -> DbResult<()> {
        self.connection
            .block_on(self.rollback_to_savepoint_async(name, &CancellationToken::new()))?
    }

    async fn rollback_to_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        let transaction = self.require_current("roll back to a savepoint")?;
        transaction.rollback_to_savepoint(name, cancel).await
    }

    fn release_savepoint(&self, name: &str) -> DbResult<()> {
        self.connection
            .block_on(self.release_savepoint_async(name, &CancellationToken::new()))?
    }

    async fn release_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        let transaction = self.require_current("release a savepoint")?;
        transaction.release_savepoint(name, cancel).await
    }

    fn are_savepoints_supported(&self) -> bool {
        match self.connection.current_transaction() {
            Some(transaction) => transaction.supports_savepoints(),
            None => self.connection.supports_savepoints(),
        }
    }

    fn current_transaction(&self) -> Option<Arc<dyn DbContextTransaction>> {
        self.connection
            .current_transaction()
            .map(|tx| tx as Arc<dyn DbContextTransaction>)
    }

    fn reset_state(&self) {
        if let Some(transaction) = self.connection.take_current_transaction() {
            log_debug(
                &**self.connection.logger(),
                RelationalEventId::RollingbackTransaction,
                || format!("Discarding transaction {}.", transaction.transaction_id()),
            );
            let _runtime = self.connection.enter_runtime();
            transaction.discard();
        }
    }

    async fn reset_state_async(&self) -> DbResult<()> {
        match self.connection.take_current_transaction() {
            Some(transaction) if transaction.state().is_active() => {
                transaction.rollback(&CancellationToken::new()).await
            }
            _ => Ok(()),
        }
    }
}
