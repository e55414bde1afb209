//! Command execution contract.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DbResult;
use crate::models::DbCommand;

/// Runs commands against the current transaction, or outside one when none is open.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command and return the number of rows affected.
    fn execute_non_query(&self, command: &DbCommand) -> DbResult<u64>;

    async fn execute_non_query_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> DbResult<u64>;
}
