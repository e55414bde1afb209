//! Database creator for the in-memory store.

use crate::error::{DbError, DbResult};
use crate::storage::DatabaseCreator;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Tracks whether the in-memory database has been created.
#[derive(Debug, Default)]
pub struct InMemoryDatabaseCreator {
    created: AtomicBool,
}

impl InMemoryDatabaseCreator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::Acquire)
    }
}

fn check_cancelled(cancel: &CancellationToken, operation: &str) -> DbResult<()> {
    if cancel.is_cancelled() {
        Err(DbError::cancelled(operation))
    } else {
        Ok(())
    }
}

#[async_trait]
impl DatabaseCreator for InMemoryDatabaseCreator {
    fn ensure_created(&self) -> DbResult<bool> {
        Ok(!self.created.swap(true, Ordering::AcqRel))
    }

    async fn ensure_created_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        check_cancelled(cancel, "ensure database created")?;
        self.ensure_created()
    }

    fn ensure_deleted(&self) -> DbResult<bool> {
        Ok(self.created.swap(false, Ordering::AcqRel))
    }

    async fn ensure_deleted_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        check_cancelled(cancel, "ensure database deleted")?;
        self.ensure_deleted()
    }

    fn can_connect(&self) -> DbResult<bool> {
        Ok(true)
    }

    async fn can_connect_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        check_cancelled(cancel, "check database connection")?;
        self.can_connect()
    }
}
