//! Database error types.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/admission.")]
    MigrationDirNotFound { tried: String, last_error: String },
}

/// Postgres SQLSTATE for `lock_not_available` (raised when `lock_timeout` fires).
pub(crate) const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Postgres SQLSTATE for `query_canceled` (raised when `statement_timeout` fires).
pub(crate) const QUERY_CANCELED: &str = "57014";

/// Postgres SQLSTATE for `unique_violation`.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

/// Returns the SQLSTATE code of a database error, if any.
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Returns true if the error is a lock or statement timeout.
pub(crate) fn is_timeout(err: &sqlx::Error) -> bool {
    matches!(
        sqlstate(err).as_deref(),
        Some(LOCK_NOT_AVAILABLE) | Some(QUERY_CANCELED)
    ) || matches!(err, sqlx::Error::PoolTimedOut)
}
