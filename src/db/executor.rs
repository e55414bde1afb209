//! Command execution for relational databases.
//!
//! Commands run on the context's current transaction when one is open and on
//! the pool otherwise. Every completed command is handed to the command
//! logger; failures are logged with the same layout at ERROR.

use crate::db::connection::RelationalConnection;
use crate::error::{DbError, DbResult};
use crate::logging::{log_command_error, log_command_executed};
use crate::models::{CommandKind, DbCommand};
use crate::storage::{CommandExecutor, cancellable};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Executes commands against a [`RelationalConnection`].
#[derive(Debug)]
pub struct RelationalCommandExecutor {
    connection: Arc<RelationalConnection>,
}

impl RelationalCommandExecutor {
    pub fn new(connection: Arc<RelationalConnection>) -> Self {
        Self { connection }
    }

    async fn run(&self, command: &DbCommand) -> DbResult<u64> {
        if command.kind != CommandKind::Text {
            return Err(DbError::not_supported(
                format!("{} commands", command.kind),
                self.connection.db_type().display_name(),
            ));
        }

        let transaction = self.connection.current_transaction();
        debug!(
            sql = %command.text,
            params = command.parameters.len(),
            timeout_secs = command.timeout_secs,
            in_transaction = transaction.is_some(),
            "Executing command"
        );

        let start = Instant::now();
        let execution = async {
            match &transaction {
                Some(tx) => tx.execute(command).await,
                None => self.connection.pool().execute(command).await,
            }
        };
        let result = if command.timeout_secs == 0 {
            execution.await
        } else {
            let limit = Duration::from_secs(u64::from(command.timeout_secs));
            match timeout(limit, execution).await {
                Ok(result) => result,
                Err(_) => Err(timeout_error("command execution", limit)),
            }
        };
        let end = Instant::now();

        let logger = &**self.connection.logger();
        match &result {
            Ok(_) => log_command_executed(logger, command, start, end),
            Err(e) => log_command_error(logger, command, start, end, e),
        }
        result
    }
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout(operation, limit.as_secs() as u32)
}

#[async_trait]
impl CommandExecutor for RelationalCommandExecutor {
    fn execute_non_query(&self, command: &DbCommand) -> DbResult<u64> {
        self.connection.block_on(self.run(command))?
    }

    async fn execute_non_query_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> DbResult<u64> {
        cancellable(cancel, "execute command", self.run(command)).await
    }
}
