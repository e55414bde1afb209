//! Parameter binding for commands.
//!
//! Parameters are bound positionally in the order they were added to the
//! command; their names only appear in diagnostics.

use crate::models::{DbCommand, ParameterValue};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

/// Bind a parameter to a MySQL query.
fn bind_mysql_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    param: &'q ParameterValue,
) -> Query<'q, MySql, MySqlArguments> {
    match param {
        ParameterValue::Null => query.bind(None::<String>),
        ParameterValue::Bool(v) => query.bind(*v),
        ParameterValue::Int(v) => query.bind(*v),
        ParameterValue::Float(v) => query.bind(*v),
        ParameterValue::String(v) => query.bind(v.as_str()),
        ParameterValue::Bytes(v) => query.bind(v.as_slice()),
        ParameterValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
fn bind_postgres_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q ParameterValue,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        ParameterValue::Null => query.bind(None::<String>),
        ParameterValue::Bool(v) => query.bind(*v),
        ParameterValue::Int(v) => query.bind(*v),
        ParameterValue::Float(v) => query.bind(*v),
        ParameterValue::String(v) => query.bind(v.as_str()),
        ParameterValue::Bytes(v) => query.bind(v.as_slice()),
        ParameterValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
fn bind_sqlite_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q ParameterValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        ParameterValue::Null => query.bind(None::<String>),
        ParameterValue::Bool(v) => query.bind(*v),
        ParameterValue::Int(v) => query.bind(*v),
        ParameterValue::Float(v) => query.bind(*v),
        ParameterValue::String(v) => query.bind(v.as_str()),
        ParameterValue::Bytes(v) => query.bind(v.as_slice()),
        // SQLite doesn't have native JSON type, store as string
        ParameterValue::Json(v) => query.bind(v.to_string()),
    }
}

/// Build a MySQL query for a command with all parameters bound.
pub(crate) fn mysql_query(command: &DbCommand) -> Query<'_, MySql, MySqlArguments> {
    command
        .parameters
        .iter()
        .fold(sqlx::query(&command.text), |query, p| {
            bind_mysql_param(query, &p.value)
        })
}

/// Build a PostgreSQL query for a command with all parameters bound.
pub(crate) fn postgres_query(command: &DbCommand) -> Query<'_, Postgres, PgArguments> {
    command
        .parameters
        .iter()
        .fold(sqlx::query(&command.text), |query, p| {
            bind_postgres_param(query, &p.value)
        })
}

/// Build a SQLite query for a command with all parameters bound.
pub(crate) fn sqlite_query(command: &DbCommand) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    command
        .parameters
        .iter()
        .fold(sqlx::query(&command.text), |query, p| {
            bind_sqlite_param(query, &p.value)
        })
}
