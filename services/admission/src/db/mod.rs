//! Postgres persistence for the admission ledger.
//!
//! [`Database`] owns the pool and the schema; [`PgLedgerStore`] is the
//! ledger backend built on top of it. Queries are checked at runtime, so no
//! database is needed at compile time.

mod error;
mod ledger;

pub use error::DbError;
pub use ledger::PgLedgerStore;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/rsvp";

/// Pool settings for the ledger database.
///
/// Every admission request holds one connection for the length of its unit
/// of work, so `max_connections` bounds how many events can be mutated at
/// once across the process.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a free pooled connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

impl DbConfig {
    /// Reads `DATABASE_URL`, `DB_MAX_CONNECTIONS` and `DB_MIN_CONNECTIONS`.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            ..defaults
        }
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(Some(self.idle_timeout))
            .max_lifetime(Some(self.max_lifetime))
    }
}

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

/// Directories searched for the SQL migrations, in order. Covers running
/// from the workspace root, from the crate directory, and from `cargo test`.
fn migration_dirs() -> [PathBuf; 3] {
    [
        PathBuf::from("migrations"),
        PathBuf::from("services/admission/migrations"),
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    ]
}

/// Shared handle to the ledger database.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
            "Opening ledger database pool"
        );

        let pool = config
            .pool_options()
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trips a trivial query.
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(DbError::Query)
    }

    /// Applies pending migrations from the first directory that loads.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        let dirs = migration_dirs();
        let mut last_error = None;

        for dir in &dirs {
            let migrator = match Migrator::new(dir.as_path()).await {
                Ok(migrator) => migrator,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Migrations not loadable here");
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            migrator.run(&self.pool).await.map_err(DbError::Migration)?;
            info!(
                dir = %dir.display(),
                migrations = migrator.iter().count(),
                "Ledger schema up to date"
            );
            return Ok(());
        }

        Err(DbError::MigrationDirNotFound {
            tried: dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            last_error: last_error.unwrap_or_else(|| "no candidates".to_string()),
        })
    }

    /// Ledger backend over this pool. Units of work wait at most
    /// `lock_timeout` for an event's row lock.
    pub fn ledger_store(&self, lock_timeout: Duration) -> PgLedgerStore {
        PgLedgerStore::new(self.pool.clone(), lock_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_local_database() {
        let config = DbConfig::default();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        assert_eq!(env_or::<u32>("RSVP_TEST_UNSET_POOL_SIZE", 7), 7);
    }
}
