//! dbcontext - Main entry point.
//!
//! Runs database lifecycle commands and transactional statement batches
//! against SQLite, PostgreSQL or MySQL through a `DbContext`.

use dbcontext::config::{Command, Config, ContextOptions};
use dbcontext::models::{ConnectionConfig, DbParameter};
use dbcontext::{DatabaseFacade, DbContext, DbResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the running operation");
            token.cancel();
        }
    });
}

/// Run statements in one transaction, committing unless `rollback` is set.
async fn run_exec(
    database: &DatabaseFacade,
    statements: &[String],
    params: &[DbParameter],
    savepoint: Option<&str>,
    rollback: bool,
    cancel: &CancellationToken,
) -> DbResult<()> {
    let transaction = database.begin_transaction_async(cancel).await?;
    info!(transaction_id = %transaction.transaction_id(), "Transaction started");

    for (index, sql) in statements.iter().enumerate() {
        let step = async {
            if let Some(prefix) = savepoint {
                database
                    .create_savepoint_async(&format!("{prefix}_{}", index + 1), cancel)
                    .await?;
            }
            database
                .execute_sql_raw_async(sql, params.to_vec(), cancel)
                .await
        };
        match step.await {
            Ok(rows) => println!("[{}] {} row(s) affected", index + 1, rows),
            Err(e) => {
                error!(statement = index + 1, error = %e, "Statement failed, rolling back");
                if let Err(rollback_error) = database
                    .rollback_transaction_async(&CancellationToken::new())
                    .await
                {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                return Err(e);
            }
        }
    }

    if rollback {
        database.rollback_transaction_async(cancel).await?;
        println!("Rolled back");
    } else {
        database.commit_transaction_async(cancel).await?;
        println!("Committed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    info!("Starting dbcontext v{}", env!("CARGO_PKG_VERSION"));

    let parsed = config.parse_database()?;
    let connection = ConnectionConfig::new(
        parsed.connection_string,
        parsed.database,
        parsed.pool_options,
    )?;
    info!(
        db_type = %connection.db_type,
        database = ?connection.database,
        "Using database"
    );

    let context = DbContext::builder()
        .use_relational(connection)
        .with_options(ContextOptions::from(&config))
        .build()?;
    let database = context.database();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let result: Result<(), Box<dyn std::error::Error>> = match &config.command {
        Command::EnsureCreated => database
            .ensure_created_async(&cancel)
            .await
            .map(|created| {
                println!("{}", if created { "Created" } else { "Already exists" });
            })
            .map_err(Into::into),
        Command::EnsureDeleted => database
            .ensure_deleted_async(&cancel)
            .await
            .map(|deleted| {
                println!("{}", if deleted { "Deleted" } else { "Did not exist" });
            })
            .map_err(Into::into),
        Command::CanConnect => match database.can_connect_async(&cancel).await {
            Ok(true) => {
                println!("Reachable");
                Ok(())
            }
            Ok(false) => Err("Database is not reachable".into()),
            Err(e) => Err(e.into()),
        },
        Command::Exec {
            statements,
            params,
            savepoint,
            rollback,
        } => {
            let params = params
                .iter()
                .map(|p| DbParameter::parse(p))
                .collect::<Result<Vec<_>, _>>();
            match params {
                Ok(params) => run_exec(
                    &database,
                    statements,
                    &params,
                    savepoint.as_deref(),
                    *rollback,
                    &cancel,
                )
                .await
                .map_err(Into::into),
                Err(e) => Err(e.into()),
            }
        }
    };

    if let Err(e) = context.dispose_async().await {
        warn!(error = %e, "Error while disposing the context");
    }

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    info!("Done");
    Ok(())
}
