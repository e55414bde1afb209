//! Contracts between the context facade and the stores backing it.

pub mod creator;
pub mod executor;
pub mod transaction;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{DbError, DbResult};

pub use creator::DatabaseCreator;
pub use executor::CommandExecutor;
pub use transaction::{
    DbContextTransaction, TransactionManager, TransactionMetadata, validate_savepoint_name,
};

/// Run `future` unless `cancel` fires first.
///
/// A token that is already cancelled fails before the future is polled.
pub async fn cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &str,
    future: F,
) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(DbError::cancelled(operation));
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DbError::cancelled(operation)),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable_passes_result_through() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, "fetch value", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancellable_precancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cancellable(&cancel, "fetch value", async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancellable_interrupts_pending_future() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move { trigger.cancel() });
        let err = cancellable(&cancel, "fetch value", std::future::pending::<DbResult<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Cancelled { .. }));
    }
}
