//! Database lifecycle contract implemented by backing stores.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DbResult;

/// Creates, deletes and probes the database behind a context.
#[async_trait]
pub trait DatabaseCreator: Send + Sync {
    /// Create the database if missing; `true` if it was created.
    fn ensure_created(&self) -> DbResult<bool>;

    async fn ensure_created_async(&self, cancel: &CancellationToken) -> DbResult<bool>;

    /// Delete the database if present; `true` if it was deleted.
    fn ensure_deleted(&self) -> DbResult<bool>;

    async fn ensure_deleted_async(&self, cancel: &CancellationToken) -> DbResult<bool>;

    /// Whether the database can be reached.
    fn can_connect(&self) -> DbResult<bool>;

    async fn can_connect_async(&self, cancel: &CancellationToken) -> DbResult<bool>;
}
