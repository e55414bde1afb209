//! DatabaseFacade delegation tests.
//!
//! Every facade operation must reach the configured service exactly once and
//! fail with a disposed error once the owning context is gone.

mod common;

use common::{FakeCommandExecutor, FakeDatabaseCreator, FakeTransactionManager};
use dbcontext::models::{DbParameter, ParameterValue};
use dbcontext::{DatabaseCreator, DbContext, DbContextTransaction, DbError, DbResult, TransactionManager};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio_util::sync::CancellationToken;

const NO_PARAMS: [DbParameter; 0] = [];

fn count(counter: &AtomicUsize) -> usize {
    FakeTransactionManager::count(counter)
}

fn context_with_manager(manager: &Arc<FakeTransactionManager>) -> DbContext {
    DbContext::builder()
        .with_transaction_manager(manager.clone())
        .build()
        .unwrap()
}

fn context_with_creator(creator: &Arc<FakeDatabaseCreator>) -> DbContext {
    DbContext::builder()
        .with_database_creator(creator.clone())
        .build()
        .unwrap()
}

fn same_object<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[test]
fn test_lifecycle_methods_delegate_to_creator() {
    let creator = Arc::new(FakeDatabaseCreator::default());
    let context = context_with_creator(&creator);
    let database = context.database();

    assert!(database.ensure_created().unwrap());
    assert_eq!(count(&creator.ensure_created_calls), 1);

    assert!(database.ensure_deleted().unwrap());
    assert_eq!(count(&creator.ensure_deleted_calls), 1);

    assert!(database.can_connect().unwrap());
    assert_eq!(count(&creator.can_connect_calls), 1);

    assert_eq!(count(&creator.ensure_created_async_calls), 0);
}

#[tokio::test]
async fn test_lifecycle_methods_delegate_to_creator_async() {
    let creator = Arc::new(FakeDatabaseCreator::default());
    let context = context_with_creator(&creator);
    let database = context.database();
    let cancel = CancellationToken::new();

    assert!(database.ensure_created_async(&cancel).await.unwrap());
    assert_eq!(count(&creator.ensure_created_async_calls), 1);

    assert!(database.ensure_deleted_async(&cancel).await.unwrap());
    assert_eq!(count(&creator.ensure_deleted_async_calls), 1);

    assert!(database.can_connect_async(&cancel).await.unwrap());
    assert_eq!(count(&creator.can_connect_async_calls), 1);

    assert_eq!(count(&creator.ensure_created_calls), 0);
}

#[test]
fn test_database_creator_is_the_configured_instance() {
    let creator = Arc::new(FakeDatabaseCreator::default());
    let context = context_with_creator(&creator);

    let resolved: Arc<dyn DatabaseCreator> = context.database().database_creator().unwrap();
    assert!(same_object(&resolved, &creator));
}

#[test]
fn test_transaction_manager_is_the_configured_instance() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);

    let resolved: Arc<dyn TransactionManager> = context.database().transaction_manager().unwrap();
    assert!(same_object(&resolved, &manager));
}

#[test]
fn test_begin_transaction_returns_manager_handle() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);

    let transaction = context.database().begin_transaction().unwrap();
    assert!(same_object(&transaction, &manager.transaction));
    assert_eq!(count(&manager.begin_calls), 1);
}

#[tokio::test]
async fn test_begin_transaction_async_returns_manager_handle() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);

    let transaction = context
        .database()
        .begin_transaction_async(&CancellationToken::new())
        .await
        .unwrap();
    assert!(same_object(&transaction, &manager.transaction));
    assert_eq!(count(&manager.begin_calls), 1);
}

#[test]
fn test_current_transaction_is_the_begun_handle() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    let database = context.database();

    assert!(database.current_transaction().unwrap().is_none());
    let begun = database.begin_transaction().unwrap();
    let current = database.current_transaction().unwrap().unwrap();
    assert!(same_object(&begun, &current));
    assert_eq!(current.transaction_id(), manager.transaction.transaction_id());
}

#[test]
fn test_commit_and_rollback_delegate() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    let database = context.database();

    database.commit_transaction().unwrap();
    assert_eq!(count(&manager.commit_calls), 1);

    // No de-duplication: a second call reaches the manager again
    database.commit_transaction().unwrap();
    assert_eq!(count(&manager.commit_calls), 2);

    database.rollback_transaction().unwrap();
    assert_eq!(count(&manager.rollback_calls), 1);
}

#[tokio::test]
async fn test_commit_and_rollback_delegate_async() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    let database = context.database();
    let cancel = CancellationToken::new();

    database.commit_transaction_async(&cancel).await.unwrap();
    assert_eq!(count(&manager.commit_calls), 1);

    database.rollback_transaction_async(&cancel).await.unwrap();
    assert_eq!(count(&manager.rollback_calls), 1);
}

#[test]
fn test_savepoint_operations_delegate() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    let database = context.database();

    database.create_savepoint("Bar").unwrap();
    assert_eq!(count(&manager.create_savepoint_calls), 1);
    assert_eq!(manager.last_savepoint.lock().as_deref(), Some("Bar"));

    database.rollback_to_savepoint("Bar").unwrap();
    assert_eq!(count(&manager.rollback_savepoint_calls), 1);

    database.release_savepoint("Baz").unwrap();
    assert_eq!(count(&manager.release_savepoint_calls), 1);
    assert_eq!(manager.last_savepoint.lock().as_deref(), Some("Baz"));
}

#[tokio::test]
async fn test_savepoint_operations_delegate_async() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    let database = context.database();
    let cancel = CancellationToken::new();

    database.create_savepoint_async("Bar", &cancel).await.unwrap();
    assert_eq!(count(&manager.create_savepoint_calls), 1);

    database
        .rollback_to_savepoint_async("Bar", &cancel)
        .await
        .unwrap();
    assert_eq!(count(&manager.rollback_savepoint_calls), 1);

    database.release_savepoint_async("Bar", &cancel).await.unwrap();
    assert_eq!(count(&manager.release_savepoint_calls), 1);
}

#[test]
fn test_consecutive_savepoint_support_reads_are_not_cached() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    let database = context.database();

    assert!(database.are_savepoints_supported().unwrap());
    assert_eq!(count(&manager.are_savepoints_supported_calls), 1);
    assert!(database.are_savepoints_supported().unwrap());
    assert_eq!(count(&manager.are_savepoints_supported_calls), 2);
}

#[test]
fn test_are_savepoints_supported_queries_manager_each_time() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    let database = context.database();

    assert!(database.are_savepoints_supported().unwrap());
    assert_eq!(count(&manager.are_savepoints_supported_calls), 1);

    manager.set_savepoints_supported(false);
    assert!(!database.are_savepoints_supported().unwrap());
    assert_eq!(count(&manager.are_savepoints_supported_calls), 2);
}

#[test]
fn test_provider_name_override() {
    let context = DbContext::builder().provider_name("Fake").build().unwrap();
    assert_eq!(context.database().provider_name().unwrap(), "Fake");
}

#[test]
fn test_execute_sql_raw_builds_command() {
    let executor = Arc::new(FakeCommandExecutor::new(3));
    let context = DbContext::builder()
        .with_command_executor(executor.clone())
        .command_timeout(5)
        .build()
        .unwrap();

    let rows = context
        .database()
        .execute_sql_raw(
            "UPDATE t SET a = ? WHERE id = ?",
            [
                DbParameter::new("@a", ParameterValue::String("x".to_string())),
                DbParameter::new("@id", ParameterValue::Int(7)),
            ],
        )
        .unwrap();
    assert_eq!(rows, 3);

    let commands = executor.commands.lock();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].text, "UPDATE t SET a = ? WHERE id = ?");
    assert_eq!(commands[0].timeout_secs, 5);
    let names: Vec<&str> = commands[0].parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["@a", "@id"]);
}

#[test]
fn test_execute_sql_raw_without_executor_is_not_supported() {
    let context = DbContext::builder().build().unwrap();
    let err = context
        .database()
        .execute_sql_raw("DELETE FROM t", NO_PARAMS)
        .unwrap_err();
    assert!(matches!(err, DbError::NotSupported { .. }), "got {err:?}");
}

#[test]
fn test_dispose_resets_manager_state() {
    let manager = Arc::new(FakeTransactionManager::new());
    let context = context_with_manager(&manager);
    context.database().begin_transaction().unwrap();

    context.dispose();
    assert_eq!(count(&manager.reset_state_calls), 1);
    assert!(manager.current_transaction().is_none());

    // Dropping a disposed context does not reset again
    drop(context);
    assert_eq!(count(&manager.reset_state_calls), 1);
}

#[tokio::test]
async fn test_facade_cannot_be_used_after_dispose() {
    let context = DbContext::builder()
        .with_transaction_manager(Arc::new(FakeTransactionManager::new()))
        .with_database_creator(Arc::new(FakeDatabaseCreator::default()))
        .with_command_executor(Arc::new(FakeCommandExecutor::new(0)))
        .build()
        .unwrap();
    let database = context.database();
    context.dispose();
    assert!(context.is_disposed());

    let cancel = CancellationToken::new();

    // Keep in sync with the public operations of DatabaseFacade
    let results: Vec<(&str, DbResult<()>)> = vec![
        ("begin_transaction", database.begin_transaction().map(drop)),
        (
            "begin_transaction_async",
            database.begin_transaction_async(&cancel).await.map(drop),
        ),
        ("commit_transaction", database.commit_transaction()),
        (
            "commit_transaction_async",
            database.commit_transaction_async(&cancel).await,
        ),
        ("rollback_transaction", database.rollback_transaction()),
        (
            "rollback_transaction_async",
            database.rollback_transaction_async(&cancel).await,
        ),
        ("create_savepoint", database.create_savepoint("sp")),
        (
            "create_savepoint_async",
            database.create_savepoint_async("sp", &cancel).await,
        ),
        ("rollback_to_savepoint", database.rollback_to_savepoint("sp")),
        (
            "rollback_to_savepoint_async",
            database.rollback_to_savepoint_async("sp", &cancel).await,
        ),
        ("release_savepoint", database.release_savepoint("sp")),
        (
            "release_savepoint_async",
            database.release_savepoint_async("sp", &cancel).await,
        ),
        (
            "are_savepoints_supported",
            database.are_savepoints_supported().map(drop),
        ),
        ("current_transaction", database.current_transaction().map(drop)),
        ("ensure_created", database.ensure_created().map(drop)),
        (
            "ensure_created_async",
            database.ensure_created_async(&cancel).await.map(drop),
        ),
        ("ensure_deleted", database.ensure_deleted().map(drop)),
        (
            "ensure_deleted_async",
            database.ensure_deleted_async(&cancel).await.map(drop),
        ),
        ("can_connect", database.can_connect().map(drop)),
        (
            "can_connect_async",
            database.can_connect_async(&cancel).await.map(drop),
        ),
        ("database_creator", database.database_creator().map(drop)),
        ("transaction_manager", database.transaction_manager().map(drop)),
        ("provider_name", database.provider_name().map(drop)),
        (
            "execute_sql_raw",
            database.execute_sql_raw("SELECT 1", NO_PARAMS).map(drop),
        ),
        (
            "execute_sql_raw_async",
            database
                .execute_sql_raw_async("SELECT 1", NO_PARAMS, &cancel)
                .await
                .map(drop),
        ),
    ];

    for (operation, result) in results {
        match result {
            Err(e) => assert!(e.is_disposed(), "{operation}: expected disposed error, got {e:?}"),
            Ok(()) => panic!("{operation} succeeded after dispose"),
        }
    }
}

#[test]
fn test_disposed_error_names_the_facade() {
    let context = DbContext::builder().build().unwrap();
    let database = context.database();
    drop(context);

    let err = database.can_connect().unwrap_err();
    assert!(err.to_string().contains("DatabaseFacade"), "got {err}");
}
