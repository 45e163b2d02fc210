//! Process-wide configuration, resolved once at boot from the environment.
//!
//! No generic config-file/CLI parsing layer — that surface is out of scope.
//! Mirrors `everruns-worker/src/main.rs`'s `std::env::var(...).expect(...)`
//! style: a handful of env vars with sensible defaults, read once and passed
//! explicitly down the call tree rather than read again from an ambient
//! singleton (Design Note: "Global mutable state").

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Memory,
    Persistent,
    Distributed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct RetryDefaults {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub conn_string: String,
    pub driver: DatabaseDriver,
    pub auto_migrate: bool,
}

#[derive(Debug, Clone)]
pub struct WebhookDefaults {
    pub default_max_body: usize,
    pub default_dedupe_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct CompozyConfig {
    pub mode: RuntimeMode,
    pub task_queue: String,
    pub activity_timeout: Duration,
    pub workflow_timeout: Duration,
    pub max_collection_items: usize,
    pub retry: RetryDefaults,
    pub database: DatabaseConfig,
}

impl CompozyConfig {
    /// Loads configuration from the process environment, falling back to
    /// conservative in-memory defaults so tests and local runs need no setup.
    pub fn from_env() -> Self {
        let mode = match env::var("COMPOZY_MODE").as_deref() {
            Ok("persistent") => RuntimeMode::Persistent,
            Ok("distributed") => RuntimeMode::Distributed,
            _ => RuntimeMode::Memory,
        };

        let database_url = env::var("DATABASE_URL").unwrap_or_default();
        let driver = if database_url.starts_with("postgres") {
            DatabaseDriver::Postgres
        } else {
            DatabaseDriver::Sqlite
        };

        Self {
            mode,
            task_queue: env::var("COMPOZY_TASK_QUEUE").unwrap_or_else(|_| "compozy-tasks".to_string()),
            activity_timeout: Duration::from_secs(env_u64("COMPOZY_ACTIVITY_TIMEOUT_SECS", 60)),
            workflow_timeout: Duration::from_secs(env_u64("COMPOZY_WORKFLOW_TIMEOUT_SECS", 3600)),
            max_collection_items: env_u64("COMPOZY_MAX_COLLECTION_ITEMS", 1000) as usize,
            retry: RetryDefaults {
                max_attempts: env_u64("COMPOZY_RETRY_MAX_ATTEMPTS", 3) as u32,
                initial_delay: Duration::from_millis(env_u64("COMPOZY_RETRY_INITIAL_DELAY_MS", 500)),
                max_delay: Duration::from_millis(env_u64("COMPOZY_RETRY_MAX_DELAY_MS", 30_000)),
                backoff_factor: 2.0,
            },
            database: DatabaseConfig {
                conn_string: database_url,
                driver,
                auto_migrate: env::var("COMPOZY_AUTO_MIGRATE").map(|v| v == "true").unwrap_or(false),
            },
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Default for CompozyConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Memory,
            task_queue: "compozy-tasks".to_string(),
            activity_timeout: Duration::from_secs(60),
            workflow_timeout: Duration::from_secs(3600),
            max_collection_items: 1000,
            retry: RetryDefaults {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_millis(30_000),
                backoff_factor: 2.0,
            },
            database: DatabaseConfig {
                conn_string: String::new(),
                driver: DatabaseDriver::Sqlite,
                auto_migrate: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_runs_in_memory() {
        let cfg = CompozyConfig::default();
        assert_eq!(cfg.mode, RuntimeMode::Memory);
        assert_eq!(cfg.max_collection_items, 1000);
    }
}
