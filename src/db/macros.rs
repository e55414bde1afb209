//! Backend dispatch macro.
//!
//! Pools and transactions are enums with one variant per backend; this macro
//! expands the per-backend match arms so each call site stays a flat list.

/// Generate match arms over a backend enum.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool, self, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($enum:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $enum::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
