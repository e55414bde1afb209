//! Transaction contracts implemented by backing stores.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::TransactionState;

/// Snapshot of a transaction session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionMetadata {
    pub transaction_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub state: TransactionState,
    pub savepoints: Vec<String>,
}

/// Handle to one transaction session.
///
/// Handles are shared as `Arc<dyn DbContextTransaction>`; two handles refer to
/// the same session exactly when `Arc::ptr_eq` holds.
#[async_trait]
pub trait DbContextTransaction: std::fmt::Debug + Send + Sync {
    fn transaction_id(&self) -> Uuid;

    fn state(&self) -> TransactionState;

    fn started_at(&self) -> DateTime<Utc>;

    fn supports_savepoints(&self) -> bool {
        false
    }

    /// Savepoint names in creation order.
    fn savepoints(&self) -> Vec<String> {
        Vec::new()
    }

    fn metadata(&self) -> TransactionMetadata {
        TransactionMetadata {
            transaction_id: self.transaction_id(),
            started_at: self.started_at(),
            state: self.state(),
            savepoints: self.savepoints(),
        }
    }

    async fn commit(&self, cancel: &CancellationToken) -> DbResult<()>;

    async fn rollback(&self, cancel: &CancellationToken) -> DbResult<()>;

    async fn create_savepoint(&self, name: &str, _cancel: &CancellationToken) -> DbResult<()> {
        Err(DbError::savepoint("Savepoints are not supported", name))
    }

    async fn rollback_to_savepoint(
        &self,
        name: &str,
        _cancel: &CancellationToken,
    ) -> DbResult<()> {
        Err(DbError::savepoint("Savepoints are not supported", name))
    }

    async fn release_savepoint(&self, name: &str, _cancel: &CancellationToken) -> DbResult<()> {
        Err(DbError::savepoint("Savepoints are not supported", name))
    }
}

/// Coordinates the transaction of one unit of work.
///
/// Every operation has a blocking and an async form with the same semantics.
/// Implementations own the current session; callers only hold references.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    fn begin_transaction(&self) -> DbResult<Arc<dyn DbContextTransaction>>;

    async fn begin_transaction_async(
        &self,
        cancel: &CancellationToken,
    ) -> DbResult<Arc<dyn DbContextTransaction>>;

    fn commit_transaction(&self) -> DbResult<()>;

    async fn commit_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()>;

    fn rollback_transaction(&self) -> DbResult<()>;

    async fn rollback_transaction_async(&self, cancel: &CancellationToken) -> DbResult<()>;

    fn create_savepoint(&self, name: &str) -> DbResult<()>;

    async fn create_savepoint_async(&self, name: &str, cancel: &CancellationToken)
    -> DbResult<()>;

    fn rollback_to_savepoint(&self, name: &str) -> DbResult<()>;

    async fn rollback_to_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()>;

    fn release_savepoint(&self, name: &str) -> DbResult<()>;

    async fn release_savepoint_async(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DbResult<()>;

    /// Whether the live backing connection supports savepoints.
    fn are_savepoints_supported(&self) -> bool;

    /// The open session, if any.
    fn current_transaction(&self) -> Option<Arc<dyn DbContextTransaction>>;

    /// Discard any open session without waiting for the backing store.
    fn reset_state(&self);

    /// Roll back any open session and wait for it to finish.
    async fn reset_state_async(&self) -> DbResult<()>;
}

/// Check that a savepoint name is a plain SQL identifier.
pub fn validate_savepoint_name(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid savepoint name '{name}': expected a non-empty identifier of letters, digits and underscores"
        )))
    }
}
