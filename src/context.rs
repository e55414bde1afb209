//! The unit-of-work owner.
//!
//! A [`DbContext`] resolves its backing services once, when it is built, and
//! hands them out through [`DatabaseFacade`]. Disposing the context drops the
//! services; every facade obtained from it then fails with
//! [`DbError::Disposed`].

use crate::config::ContextOptions;
use crate::db::{
    RelationalCommandExecutor, RelationalConnection, RelationalDatabaseCreator,
    RelationalTransactionManager,
};
use crate::error::{DbError, DbResult};
use crate::facade::DatabaseFacade;
use crate::in_memory::{IN_MEMORY_PROVIDER, InMemoryDatabaseCreator, InMemoryTransactionManager};
use crate::logging::{SensitiveDataLogger, TracingLogSink};
use crate::models::ConnectionConfig;
use crate::storage::{CommandExecutor, DatabaseCreator, TransactionManager};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Services resolved for one context.
pub(crate) struct ContextServices {
    pub(crate) provider_name: String,
    pub(crate) transaction_manager: Arc<dyn TransactionManager>,
    pub(crate) database_creator: Arc<dyn DatabaseCreator>,
    pub(crate) command_executor: Option<Arc<dyn CommandExecutor>>,
    pub(crate) options: ContextOptions,
    connection: Option<Arc<RelationalConnection>>,
}

/// State shared between a context and its facades.
pub(crate) struct ContextInner {
    context_id: Uuid,
    /// `None` once disposed
    services: RwLock<Option<Arc<ContextServices>>>,
}

impl ContextInner {
    pub(crate) fn services(&self, object: &str) -> DbResult<Arc<ContextServices>> {
        self.services
            .read()
            .clone()
            .ok_or_else(|| DbError::disposed(object))
    }
}

/// Owns the services of one unit of work.
pub struct DbContext {
    inner: Arc<ContextInner>,
}

impl DbContext {
    pub fn builder() -> DbContextBuilder {
        DbContextBuilder::default()
    }

    /// Facade over this context's database services.
    pub fn database(&self) -> DatabaseFacade {
        DatabaseFacade::new(Arc::clone(&self.inner))
    }

    pub fn context_id(&self) -> Uuid {
        self.inner.context_id
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.services.read().is_none()
    }

    /// Release the services, discarding any open transaction.
    ///
    /// Idempotent. An open relational transaction rolls back when its
    /// connection goes back to the pool.
    pub fn dispose(&self) {
        let Some(services) = self.inner.services.write().take() else {
            return;
        };
        services.transaction_manager.reset_state();
        debug!(context_id = %self.inner.context_id, "Context disposed");
    }

    /// Release the services, waiting for any open transaction to roll back
    /// and for pooled connections to close.
    pub async fn dispose_async(&self) -> DbResult<()> {
        let Some(services) = self.inner.services.write().take() else {
            return Ok(());
        };
        let result = services.transaction_manager.reset_state_async().await;
        if let Some(connection) = &services.connection {
            connection.close().await;
        }
        debug!(context_id = %self.inner.context_id, "Context disposed");
        result
    }
}

impl Drop for DbContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("context_id", &self.inner.context_id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[derive(Debug, Default)]
enum Provider {
    #[default]
    InMemory,
    Relational(ConnectionConfig),
}

/// Builds a [`DbContext`].
///
/// Without a provider the context uses the in-memory store. Individual
/// services can be replaced, which is how tests inject fakes.
#[derive(Default)]
pub struct DbContextBuilder {
    provider: Provider,
    provider_name: Option<String>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    database_creator: Option<Arc<dyn DatabaseCreator>>,
    command_executor: Option<Arc<dyn CommandExecutor>>,
    logger: Option<Arc<dyn SensitiveDataLogger>>,
    options: ContextOptions,
}

impl DbContextBuilder {
    pub fn use_in_memory(mut self) -> Self {
        self.provider = Provider::InMemory;
        self
    }

    /// Back the context with a relational database.
    ///
    /// [`build`](Self::build) must then run inside a Tokio runtime.
    pub fn use_relational(mut self, config: ConnectionConfig) -> Self {
        self.provider = Provider::Relational(config);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn with_transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = Some(manager);
        self
    }

    pub fn with_database_creator(mut self, creator: Arc<dyn DatabaseCreator>) -> Self {
        self.database_creator = Some(creator);
        self
    }

    pub fn with_command_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.command_executor = Some(executor);
        self
    }

    /// Replace the default `tracing` sink.
    pub fn with_logger(mut self, logger: Arc<dyn SensitiveDataLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.options.sensitive_data_logging = enabled;
        self
    }

    pub fn command_timeout(mut self, timeout_secs: u32) -> Self {
        self.options.command_timeout = timeout_secs;
        self
    }

    pub fn build(self) -> DbResult<DbContext> {
        let options = self.options;
        let logger = self.logger.unwrap_or_else(|| {
            Arc::new(TracingLogSink::new(options.sensitive_data_logging))
        });
        if options.sensitive_data_logging {
            warn!("Sensitive data logging is enabled; parameter values will appear in logs");
        }

        let (provider_name, transaction_manager, database_creator, command_executor, connection): (
            String,
            Arc<dyn TransactionManager>,
            Arc<dyn DatabaseCreator>,
            Option<Arc<dyn CommandExecutor>>,
            Option<Arc<RelationalConnection>>,
        ) = match self.provider {
            Provider::InMemory => (
                IN_MEMORY_PROVIDER.to_string(),
                Arc::new(InMemoryTransactionManager::new(Arc::clone(&logger))),
                Arc::new(InMemoryDatabaseCreator::new()),
                None,
                None,
            ),
            Provider::Relational(config) => {
                let provider_name = config.db_type.display_name().to_string();
                let connection = Arc::new(RelationalConnection::new(config, Arc::clone(&logger))?);
                (
                    provider_name,
                    Arc::new(RelationalTransactionManager::new(Arc::clone(&connection))),
                    Arc::new(RelationalDatabaseCreator::new(Arc::clone(&connection))),
                    Some(Arc::new(RelationalCommandExecutor::new(Arc::clone(&connection)))),
                    Some(connection),
                )
            }
        };

        let services = ContextServices {
            provider_name: self.provider_name.unwrap_or(provider_name),
            transaction_manager: self.transaction_manager.unwrap_or(transaction_manager),
            database_creator: self.database_creator.unwrap_or(database_creator),
            command_executor: self.command_executor.or(command_executor),
            options,
            connection,
        };

        let context_id = Uuid::new_v4();
        debug!(
            context_id = %context_id,
            provider = %services.provider_name,
            "Context created"
        );
        Ok(DbContext {
            inner: Arc::new(ContextInner {
                context_id,
                services: RwLock::new(Some(Arc::new(services))),
            }),
        })
    }
}
