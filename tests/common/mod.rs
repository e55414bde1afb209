//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbcontext::logging::{LogSink, SensitiveDataLogger};
use dbcontext::models::{
    CommandDescription, CommandKind, DbCommand, DbParameter, TransactionState,
};
use dbcontext::{CommandExecutor, DatabaseCreator, DbContextTransaction, DbResult, TransactionManager};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use uuid::Uuid;

/// Transaction handle with no behavior of its own.
#[derive(Debug)]
pub struct FakeTransaction {
    id: Uuid,
    started_at: DateTime<Utc>,
}

impl FakeTransaction {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

#[async_trait]
impl DbContextTransaction for FakeTransaction {
    fn transaction_id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> TransactionState {
        TransactionState::Active
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    async fn commit(&self, _cancel: &CancellationToken) -> DbResult<()> {
        Ok(())
    }

    async fn rollback(&self, _cancel: &CancellationToken) -> DbResult<()> {
        Ok(())
    }
}

/// Transaction manager that counts every call it receives.
pub struct FakeTransactionManager {
    pub transaction: Arc<FakeTransaction>,
    current: Mutex<Option<Arc<FakeTransaction>>>,
    savepoints_supported: AtomicBool,
    pub begin_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
    pub rollback_calls: AtomicUsize,
    pub create_savepoint_calls: AtomicUsize,
    pub rollback_savepoint_calls: AtomicUsize,
    pub release_savepoint_calls: AtomicUsize,
    pub are_savepoints_supported_calls: AtomicUsize,
    pub reset_state_calls: AtomicUsize,
    pub last_savepoint: Mutex<Option<String>>,
}

impl FakeTransactionManager {
    pub fn new() -> Self {
        Self {
            transaction: Arc::new(FakeTransaction::new()),
            current: Mutex::new(None),
            savepoints_supported: AtomicBool::new(true),
            begin_calls: AtomicUsize::new(0),
            commit_calls: AtomicUsize::new(0),
            rollback_calls: AtomicUsize::new(0),
            create_savepoint_calls: AtomicUsize::new(0),
            rollback_savepoint_calls: AtomicUsize::new(0),
            release_savepoint_calls: AtomicUsize::new(0),
            are_savepoints_supported_calls: AtomicUsize::new(0),
            reset_state_calls: AtomicUsize::new(0),
            last_savepoint: Mutex::new(None),
        }
    }

    pub fn set_savepoints_supported(&self, supported: bool) {
        self.savepoints_supported.store(supported, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Arc<dyn DbContextTransaction> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = Some(Arc::clone(&self.transaction));
        Arc::clone(&self.transaction) as Arc<dyn DbContextTransaction>
    }

    fn savepoint(&self, counter: &AtomicUsize, name: &str) {
        counter.fetch_add(1, Ordering::SeqCst);
        *self.last_savepoint.lock() = Some(name.to_string());
    }
}

#[async_trait]
impl TransactionManager for FakeTransactionManager {
    fn begin_transaction(&self) -> DbResult<Arc<dyn DbContextTransaction>> {
        Ok(self.begin())
    }

    async fn begin_transaction_async(
        &self,
        _cancel: &CancellationToken,
    ) -> DbResult<Arc<dyn DbContextTransaction>> {
        Ok(self.begin())
    }

    fn commit_transaction(&self) -> DbResult<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_transaction_async(&self, _cancel: &CancellationToken) -> DbResult<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback_transaction(&self) -> DbResult<()> {
        self.rollback_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback_transaction_async(&self, _cancel: &CancellationToken) -> DbResult<()> {
        self.rollback_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_savepoint(&self, name: &str) -> DbResult<()> {
        self.savepoint(&self.create_savepoint_calls, name);
        Ok(())
    }

    async fn create_savepoint_async(
        &self,
        name: &str,
        _cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.savepoint(&self.create_savepoint_calls, name);
        Ok(())
    }

    fn rollback_to_savepoint(&self, name: &str) -> DbResult<()> {
        self.savepoint(&self.rollback_savepoint_calls, name);
        Ok(())
    }

    async fn rollback_to_savepoint_async(
        &self,
        name: &str,
        _cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.savepoint(&self.rollback_savepoint_calls, name);
        Ok(())
    }

    fn release_savepoint(&self, name: &str) -> DbResult<()> {
        self.savepoint(&self.release_savepoint_calls, name);
        Ok(())
    }

    async fn release_savepoint_async(
        &self,
        name: &str,
        _cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.savepoint(&self.release_savepoint_calls, name);
        Ok(())
    }

    fn are_savepoints_supported(&self) -> bool {
        self.are_savepoints_supported_calls
            .fetch_add(1, Ordering::SeqCst);
        self.savepoints_supported.load(Ordering::SeqCst)
    }

    fn current_transaction(&self) -> Option<Arc<dyn DbContextTransaction>> {
        self.current
            .lock()
            .clone()
            .map(|tx| tx as Arc<dyn DbContextTransaction>)
    }

    fn reset_state(&self) {
        self.reset_state_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = None;
    }

    async fn reset_state_async(&self) -> DbResult<()> {
        self.reset_state();
        Ok(())
    }
}

/// Database creator that answers `true` and counts every call.
#[derive(Default)]
pub struct FakeDatabaseCreator {
    pub ensure_created_calls: AtomicUsize,
    pub ensure_created_async_calls: AtomicUsize,
    pub ensure_deleted_calls: AtomicUsize,
    pub ensure_deleted_async_calls: AtomicUsize,
    pub can_connect_calls: AtomicUsize,
    pub can_connect_async_calls: AtomicUsize,
}

fn hit(counter: &AtomicUsize) -> DbResult<bool> {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(true)
}

#[async_trait]
impl DatabaseCreator for FakeDatabaseCreator {
    fn ensure_created(&self) -> DbResult<bool> {
        hit(&self.ensure_created_calls)
    }

    async fn ensure_created_async(&self, _cancel: &CancellationToken) -> DbResult<bool> {
        hit(&self.ensure_created_async_calls)
    }

    fn ensure_deleted(&self) -> DbResult<bool> {
        hit(&self.ensure_deleted_calls)
    }

    async fn ensure_deleted_async(&self, _cancel: &CancellationToken) -> DbResult<bool> {
        hit(&self.ensure_deleted_async_calls)
    }

    fn can_connect(&self) -> DbResult<bool> {
        hit(&self.can_connect_calls)
    }

    async fn can_connect_async(&self, _cancel: &CancellationToken) -> DbResult<bool> {
        hit(&self.can_connect_async_calls)
    }
}

/// Executor that records commands and reports a fixed row count.
pub struct FakeCommandExecutor {
    pub rows_affected: u64,
    pub commands: Mutex<Vec<DbCommand>>,
}

impl FakeCommandExecutor {
    pub fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            commands: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CommandExecutor for FakeCommandExecutor {
    fn execute_non_query(&self, command: &DbCommand) -> DbResult<u64> {
        self.commands.lock().push(command.clone());
        Ok(self.rows_affected)
    }

    async fn execute_non_query_async(
        &self,
        command: &DbCommand,
        _cancel: &CancellationToken,
    ) -> DbResult<u64> {
        self.execute_non_query(command)
    }
}

/// A record written to [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub event_id: i32,
    pub message: String,
}

/// Sink that keeps every record in memory.
pub struct RecordingSink {
    enabled: Vec<Level>,
    sensitive: bool,
    panic_on_sensitive_read: bool,
    pub sensitive_reads: AtomicUsize,
    pub records: Mutex<Vec<LogRecord>>,
}

impl RecordingSink {
    /// Sink with every level enabled.
    pub fn new(sensitive: bool) -> Self {
        Self::with_levels(
            &[Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE],
            sensitive,
        )
    }

    pub fn with_levels(levels: &[Level], sensitive: bool) -> Self {
        Self {
            enabled: levels.to_vec(),
            sensitive,
            panic_on_sensitive_read: false,
            sensitive_reads: AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Make reading the sensitive data flag a test failure.
    pub fn panic_on_sensitive_read(mut self) -> Self {
        self.panic_on_sensitive_read = true;
        self
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn records_with_event(&self, event_id: i32) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event_id == event_id)
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn is_enabled(&self, level: Level) -> bool {
        self.enabled.contains(&level)
    }

    fn log(&self, level: Level, event_id: i32, message: &str) {
        self.records.lock().push(LogRecord {
            level,
            event_id,
            message: message.to_string(),
        });
    }
}

impl SensitiveDataLogger for RecordingSink {
    fn log_sensitive_data(&self) -> bool {
        if self.panic_on_sensitive_read {
            panic!("sensitive data flag must not be read");
        }
        self.sensitive_reads.fetch_add(1, Ordering::SeqCst);
        self.sensitive
    }
}

/// Command whose parameters must never be enumerated.
pub struct PanickingCommand;

impl CommandDescription for PanickingCommand {
    fn command_text(&self) -> &str {
        "SELECT 1"
    }

    fn command_kind(&self) -> CommandKind {
        CommandKind::Text
    }

    fn command_timeout(&self) -> u32 {
        30
    }

    fn parameters(&self) -> &[DbParameter] {
        panic!("parameters must not be enumerated");
    }
}
