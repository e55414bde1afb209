//! Database operations of a context.
//!
//! [`DatabaseFacade`] forwards every call to the services its context was
//! built with and returns their results unchanged. The only error it raises
//! itself is [`DbError::Disposed`], for any call made after the context has
//! been disposed.

use crate::context::{ContextInner, ContextServices};
use crate::error::{DbError, DbResult};
use crate::models::{DbCommand, DbParameter};
use crate::storage::{CommandExecutor, DatabaseCreator, DbContextTransaction, TransactionManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const FACADE: &str = "DatabaseFacade";

/// Transaction, savepoint, lifecycle and raw command operations of one context.
///
/// Cheap to clone; clones share the owning context.
#[derive(Clone)]
pub struct DatabaseFacade {
    context: Arc<ContextInner>,
}

impl DatabaseFacade {
    pub(crate) fn new(context: Arc<ContextInner>) -> Self {
        Self { context }
    }

    fn services(&self) -> DbResult<Arc<ContextServices>> {
        self.context.services(FACADE)
    }

    fn transaction_manager_ref(&self) -> DbResult<Arc<dyn TransactionManager>> {
        Ok(Arc::clone(&self.services()?.transaction_manager))
    }

    fn database_creator_ref(&self) -> DbResult<Arc<dyn DatabaseCreator>> {
        Ok(Arc::clone(&self.services()?.database_creator))
    }

    // Transactions

    /// Start a transaction; the returned handle becomes the current transaction.
    pub fn begin_transaction(&self) -> DbResult<Arc<dyn DbContextTransaction>> {
        self.transaction_manager_ref()?.begin_transaction()
    }

    pub async fn begin_transaction_async(
        &self,
        cancel: &CancellationToken,
    ) -> DbResult<Arc<dyn DbContextTransaction>> {
        self.transaction_manager_ref()?
            .begin_transaction_async(cancel)
            .await
    }

    pub fn commit_transaction(&self) -> DbResult<()> {
        self.transaction_manager_ref()?.commit_transaction()
    }

    pub async fn commit_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()> {
        self.transaction_manager_ref()?
            .commit_transaction_async(cancel)
            .await
    }

    pub fn rollback_transaction(&self) -> DbResult<()> {
        self.transaction_manager_ref()?.rollback_transaction()
    }

    pub async fn rollback_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()> {
        self.transaction_manager_ref()?
            .rollback_transaction_async(cancel)
            .await
    }

    // Savepoints

    pub fn create_savepoint(&self, name: &str) -> DbResult<()> {
        self.transaction_manager_ref()?.create_savepoint(name)
    }

    pub async fn create_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.transaction_manager_ref()?
            .create_savepoint_async(name, cancel)
            .await
    }

    pub fn rollback_to_savepoint(&self, name: &str) -> DbResult<()> {
        self.transaction_manager_ref()?.rollback_to_savepoint(name)
    }

    pub async fn rollback_to_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.transaction_manager_ref()?
            .rollback_to_savepoint_async(name, cancel)
            .await
    }

    pub fn release_savepoint(&self, name: &str) -> DbResult<()> {
        self.transaction_manager_ref()?.release_savepoint(name)
    }

    pub async fn release_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.transaction_manager_ref()?
            .release_savepoint_async(name, cancel)
            .await
    }

    /// Asks the transaction manager on every call; the answer is never cached.
    pub fn are_savepoints_supported(&self) -> DbResult<bool> {
        Ok(self.transaction_manager_ref()?.are_savepoints_supported())
    }

    pub fn current_transaction(&self) -> DbResult<Option<Arc<dyn DbContextTransaction>>> {
        Ok(self.transaction_manager_ref()?.current_transaction())
    }

    // Database lifecycle

    pub fn ensure_created(&self) -> DbResult<bool> {
        self.database_creator_ref()?.ensure_created()
    }

    pub async fn ensure_created_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        self.database_creator_ref()?
            .ensure_created_async(cancel)
            .await
    }

    pub fn ensure_deleted(&self) -> DbResult<bool> {
        self.database_creator_ref()?.ensure_deleted()
    }

    pub async fn ensure_deleted_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        self.database_creator_ref()?
            .ensure_deleted_async(cancel)
            .await
    }

    pub fn can_connect(&self) -> DbResult<bool> {
        self.database_creator_ref()?.can_connect()
    }

    pub async fn can_connect_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        self.database_creator_ref()?.can_connect_async(cancel).await
    }

    // Services

    pub fn database_creator(&self) -> DbResult<Arc<dyn DatabaseCreator>> {
        self.database_creator_ref()
    }

    pub fn transaction_manager(&self) -> DbResult<Arc<dyn TransactionManager>> {
        self.transaction_manager_ref()
    }

    pub fn provider_name(&self) -> DbResult<String> {
        Ok(self.services()?.provider_name.clone())
    }

    // Raw commands

    /// Run a statement and return the number of rows affected.
    ///
    /// Runs inside the current transaction when one is open. Parameters are
    /// bound in order.
    pub fn execute_sql_raw(
        &self,
        sql: &str,
        parameters: impl IntoIterator<Item = DbParameter>,
    ) -> DbResult<u64> {
        let (executor, command) = self.prepare_command(sql, parameters)?;
        executor.execute_non_query(&command)
    }

    pub async fn execute_sql_raw_async(
        &self,
        sql: &str,
        parameters: impl IntoIterator<Item = DbParameter>,
        cancel: &CancellationToken,
    ) -> DbResult<u64> {
        let (executor, command) = self.prepare_command(sql, parameters)?;
        executor.execute_non_query_async(&command, cancel).await
    }

    fn prepare_command(
        &self,
        sql: &str,
        parameters: impl IntoIterator<Item = DbParameter>,
    ) -> DbResult<(Arc<dyn CommandExecutor>, DbCommand)> {
        let services = self.services()?;
        let executor = services.command_executor.clone().ok_or_else(|| {
            DbError::not_supported("raw SQL commands", services.provider_name.clone())
        })?;
        let command = DbCommand::new(sql)
            .with_parameters(parameters)
            .with_timeout(services.options.command_timeout);
        Ok((executor, command))
    }
}

impl std::fmt::Debug for DatabaseFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseFacade")
            .field("disposed", &self.services().is_err())
            .finish()
    }
}
