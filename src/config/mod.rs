use std::env;
use std::time::Duration;

use crate::db::RetryPolicy;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub db_busy_timeout_ms: u64,
    pub listen_addr: String,
    pub sync_retry_max: u32,
    pub sync_retry_delay_ms: u64,
    pub default_actor: String,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    /// A `.env` file in the working directory is read first if present.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Self {
            db_path: get_env("DB_PATH", "/data/rack-sync.db"),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 5),
            db_busy_timeout_ms: parse_env("DB_BUSY_TIMEOUT_MS", 5000),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            sync_retry_max: parse_env("SYNC_RETRY_MAX", 3),
            sync_retry_delay_ms: parse_env("SYNC_RETRY_DELAY_MS", 200),
            default_actor: get_env("DEFAULT_ACTOR", "system"),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.db_busy_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync_retry_max.max(1),
            initial_delay: Duration::from_millis(self.sync_retry_delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "/data/rack-sync.db".to_string(),
            db_max_connections: 5,
            db_busy_timeout_ms: 5000,
            listen_addr: "0.0.0.0:8080".to_string(),
            sync_retry_max: 3,
            sync_retry_delay_ms: 200,
            default_actor: "system".to_string(),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
