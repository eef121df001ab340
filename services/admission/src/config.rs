use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::admission::AdminCapacityPolicy;
use crate::db::DbConfig;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Which ledger backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "pg" => Some(Self::Postgres),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub storage: StorageBackend,
    pub lock_timeout: Duration,
    pub admin_capacity_policy: AdminCapacityPolicy,
    pub public_base_url: String,
    pub database: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("RSVP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("RSVP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("RSVP_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let storage = match std::env::var("RSVP_STORAGE") {
            Ok(raw) => StorageBackend::parse(&raw)
                .ok_or_else(|| anyhow!("RSVP_STORAGE must be 'postgres' or 'memory', got {raw:?}"))?,
            Err(_) => StorageBackend::Postgres,
        };

        let lock_timeout = match std::env::var("RSVP_LOCK_TIMEOUT_MS") {
            Ok(raw) => parse_lock_timeout(&raw)?,
            Err(_) => DEFAULT_LOCK_TIMEOUT,
        };

        let admin_capacity_policy = match std::env::var("RSVP_ADMIN_CAPACITY_POLICY") {
            Ok(raw) => AdminCapacityPolicy::parse(&raw).ok_or_else(|| {
                anyhow!("RSVP_ADMIN_CAPACITY_POLICY must be 'hard_cap' or 'soft_target', got {raw:?}")
            })?,
            Err(_) => AdminCapacityPolicy::default(),
        };

        let public_base_url = std::env::var("RSVP_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let database = DbConfig::from_env();

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            storage,
            lock_timeout,
            admin_capacity_policy,
            public_base_url,
            database,
        })
    }
}

/// Parses `RSVP_LOCK_TIMEOUT_MS`. Zero is rejected: Postgres reads a zero
/// `lock_timeout` as "wait forever".
fn parse_lock_timeout(raw: &str) -> Result<Duration> {
    let ms: u64 = raw.trim().parse().map_err(|e| {
        anyhow!("RSVP_LOCK_TIMEOUT_MS must be a whole number of milliseconds, got {raw:?}: {e}")
    })?;
    if ms == 0 {
        return Err(anyhow!("RSVP_LOCK_TIMEOUT_MS must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}
