//! Database creation and deletion for relational backends.
//!
//! SQLite databases are files; PostgreSQL and MySQL databases are created and
//! dropped through a server-level connection that does not target the
//! database itself.

use crate::db::connection::RelationalConnection;
use crate::db::pool::{acquire_error, sqlite_connect_options};
use crate::error::{DbError, DbResult};
use crate::logging::{RelationalEventId, log_debug};
use crate::models::DatabaseType;
use crate::storage::{DatabaseCreator, DbContextTransaction, cancellable};
use async_trait::async_trait;
use sqlx::{ConnectOptions, Connection, MySqlConnection, PgConnection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Database used for server-level PostgreSQL connections.
const POSTGRES_MAINTENANCE_DATABASE: &str = "postgres";

/// Creates, drops and probes the database named by a connection string.
#[derive(Debug)]
pub struct RelationalDatabaseCreator {
    connection: Arc<RelationalConnection>,
}

impl RelationalDatabaseCreator {
    pub fn new(connection: Arc<RelationalConnection>) -> Self {
        Self { connection }
    }

    fn db_type(&self) -> DatabaseType {
        self.connection.db_type()
    }

    /// Name of the target database; required for server-based backends.
    fn database_name(&self) -> DbResult<&str> {
        self.connection
            .config()
            .database
            .as_deref()
            .ok_or_else(|| {
                DbError::invalid_input(
                    "The connection string does not name a database to create or delete",
                )
            })
    }

    /// Build a connection URL that targets the server rather than the database.
    fn server_url(&self) -> DbResult<String> {
        let base = &self.connection.config().connection_string;
        let mut url = url::Url::parse(base).map_err(|e| {
            DbError::connection(
                format!("Invalid base connection URL: {}", e),
                "Check the connection URL format",
            )
        })?;
        match self.db_type() {
            DatabaseType::PostgreSQL => url.set_path(&format!("/{POSTGRES_MAINTENANCE_DATABASE}")),
            _ => url.set_path(""),
        }
        Ok(url.to_string())
    }

    /// Resolve the SQLite database file, or `None` for in-memory databases.
    fn sqlite_path(&self) -> DbResult<Option<PathBuf>> {
        let connection_string = &self.connection.config().connection_string;
        if connection_string.contains(":memory:") || connection_string.contains("mode=memory") {
            return Ok(None);
        }
        let options = sqlite_connect_options(connection_string)?;
        Ok(Some(options.get_filename().to_path_buf()))
    }

    async fn exists(&self) -> DbResult<bool> {
        match self.db_type() {
            DatabaseType::SQLite => match self.sqlite_path()? {
                Some(path) => Ok(tokio::fs::try_exists(&path).await.unwrap_or(false)),
                None => Ok(true),
            },
            DatabaseType::PostgreSQL => {
                let name = self.database_name()?;
                let mut conn = self.connect_postgres_server().await?;
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)",
                )
                .bind(name)
                .fetch_one(&mut conn)
                .await?;
                conn.close().await?;
                Ok(exists)
            }
            DatabaseType::MySQL => {
                let name = self.database_name()?;
                let mut conn = self.connect_mysql_server().await?;
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = ?",
                )
                .bind(name)
                .fetch_one(&mut conn)
                .await?;
                conn.close().await?;
                Ok(count > 0)
            }
        }
    }

    async fn create(&self) -> DbResult<()> {
        match self.db_type() {
            DatabaseType::SQLite => {
                let Some(path) = self.sqlite_path()? else {
                    return Ok(());
                };
                let connection_string = &self.connection.config().connection_string;
                let conn = sqlite_connect_options(connection_string)?
                    .create_if_missing(true)
                    .connect()
                    .await
                    .map_err(|e| acquire_error(DatabaseType::SQLite, e))?;
                conn.close().await?;
                debug!(path = %path.display(), "Created SQLite database file");
                Ok(())
            }
            DatabaseType::PostgreSQL => {
                let sql = format!("CREATE DATABASE {}", quote_identifier(self.database_name()?, '"'));
                let mut conn = self.connect_postgres_server().await?;
                sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&sql)).await?;
                conn.close().await?;
                Ok(())
            }
            DatabaseType::MySQL => {
                let sql = format!("CREATE DATABASE {}", quote_identifier(self.database_name()?, '`'));
                let mut conn = self.connect_mysql_server().await?;
                sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&sql)).await?;
                conn.close().await?;
                Ok(())
            }
        }
    }

    async fn delete(&self) -> DbResult<()> {
        // Pooled connections would keep the database open
        self.connection.reset_pool().await?;
        match self.db_type() {
            DatabaseType::SQLite => {
                if let Some(path) = self.sqlite_path()? {
                    remove_sqlite_files(&path).await?;
                }
                Ok(())
            }
            DatabaseType::PostgreSQL => {
                let sql = format!("DROP DATABASE {}", quote_identifier(self.database_name()?, '"'));
                let mut conn = self.connect_postgres_server().await?;
                sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&sql)).await?;
                conn.close().await?;
                Ok(())
            }
            DatabaseType::MySQL => {
                let sql = format!("DROP DATABASE {}", quote_identifier(self.database_name()?, '`'));
                let mut conn = self.connect_mysql_server().await?;
                sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&sql)).await?;
                conn.close().await?;
                Ok(())
            }
        }
    }

    async fn connect_postgres_server(&self) -> DbResult<PgConnection> {
        PgConnection::connect(&self.server_url()?)
            .await
            .map_err(|e| acquire_error(DatabaseType::PostgreSQL, e))
    }

    async fn connect_mysql_server(&self) -> DbResult<MySqlConnection> {
        MySqlConnection::connect(&self.server_url()?)
            .await
            .map_err(|e| acquire_error(DatabaseType::MySQL, e))
    }

    async fn ensure_created_inner(&self) -> DbResult<bool> {
        if self.exists().await? {
            return Ok(false);
        }
        log_debug(&**self.connection.logger(), RelationalEventId::CreatingDatabase, || {
            format!("Creating {} database.", self.db_type().display_name())
        });
        self.create().await?;
        info!(db_type = %self.db_type(), database = ?self.connection.config().database, "Database created");
        Ok(true)
    }

    async fn ensure_deleted_inner(&self) -> DbResult<bool> {
        // Closing the pool waits for the connection the transaction holds
        if let Some(transaction) = self.connection.current_transaction() {
            return Err(DbError::transaction(
                "Cannot delete the database while a transaction is in progress",
                Some(transaction.transaction_id().to_string()),
            ));
        }
        if self.sqlite_path()?.is_none() && self.db_type() == DatabaseType::SQLite {
            return Ok(false);
        }
        if !self.exists().await? {
            return Ok(false);
        }
        log_debug(&**self.connection.logger(), RelationalEventId::DeletingDatabase, || {
            format!("Deleting {} database.", self.db_type().display_name())
        });
        self.delete().await?;
        info!(db_type = %self.db_type(), database = ?self.connection.config().database, "Database deleted");
        Ok(true)
    }

    async fn can_connect_inner(&self) -> DbResult<bool> {
        match self.connection.pool().ping().await {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(error = %e, "Database is not reachable");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl DatabaseCreator for RelationalDatabaseCreator {
    fn ensure_created(&self) -> DbResult<bool> {
        self.connection.block_on(self.ensure_created_inner())?
    }

    async fn ensure_created_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        cancellable(cancel, "ensure database created", self.ensure_created_inner()).await
    }

    fn ensure_deleted(&self) -> DbResult<bool> {
        self.connection.block_on(self.ensure_deleted_inner())?
    }

    async fn ensure_deleted_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        cancellable(cancel, "ensure database deleted", self.ensure_deleted_inner()).await
    }

    fn can_connect(&self) -> DbResult<bool> {
        self.connection.block_on(self.can_connect_inner())?
    }

    async fn can_connect_async(&self, cancel: &CancellationToken) -> DbResult<bool> {
        cancellable(cancel, "check database connection", self.can_connect_inner()).await
    }
}

/// Quote an identifier, doubling any embedded quote characters.
fn quote_identifier(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}

/// Remove a SQLite database file along with its journal side files.
async fn remove_sqlite_files(path: &Path) -> DbResult<()> {
    tokio::fs::remove_file(path).await.map_err(|e| {
        DbError::database(
            format!("Failed to delete {}: {}", path.display(), e),
            None,
            "Check that no other process holds the database open",
        )
    })?;
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        // Side files only exist in some journal modes
        let _ = tokio::fs::remove_file(PathBuf::from(side)).await;
    }
    Ok(())
}
