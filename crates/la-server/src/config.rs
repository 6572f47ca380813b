//! Server configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::path::PathBuf;
use std::str::FromStr;

use la_core::{AuditConfig, Config, CryptoConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Library configuration (audit pipeline, crypto).
    pub config: Config,

    /// Optional JSON seed for the in-memory repositories.
    pub seed_file: Option<PathBuf>,

    /// Log filter.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// ## Errors
    ///
    /// Returns an error if `LA_ENCRYPTION_KEY` is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let encryption_key = std::env::var("LA_ENCRYPTION_KEY").map_err(|_| {
            anyhow::anyhow!("LA_ENCRYPTION_KEY environment variable is required")
        })?;

        let defaults = AuditConfig::default();
        let audit = AuditConfig {
            changelog_poll_interval_ms: env_or(
                "LA_CHANGELOG_POLL_INTERVAL_MS",
                defaults.changelog_poll_interval_ms,
            )?,
            changelog_initial_delay_ms: env_or(
                "LA_CHANGELOG_INITIAL_DELAY_MS",
                defaults.changelog_initial_delay_ms,
            )?,
            changelog_max_entries: env_or("LA_CHANGELOG_MAX_ENTRIES", defaults.changelog_max_entries)?,
            changelog_connect_timeout_secs: env_or(
                "LA_CHANGELOG_CONNECT_TIMEOUT_SECS",
                defaults.changelog_connect_timeout_secs,
            )?,
            changelog_response_timeout_secs: env_or(
                "LA_CHANGELOG_RESPONSE_TIMEOUT_SECS",
                defaults.changelog_response_timeout_secs,
            )?,
            queue_capacity: env_or("LA_AUDIT_QUEUE_CAPACITY", defaults.queue_capacity)?,
            workers: env_or("LA_AUDIT_WORKERS", defaults.workers)?,
        };

        let seed_file = std::env::var("LA_SEED_FILE").ok().map(PathBuf::from);
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            config: Config {
                audit,
                crypto: CryptoConfig { encryption_key },
            },
            seed_file,
            log_level,
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing(encryption_key: &str) -> Self {
        Self {
            config: Config {
                audit: AuditConfig::default(),
                crypto: CryptoConfig {
                    encryption_key: encryption_key.to_string(),
                },
            },
            seed_file: None,
            log_level: "debug".to_string(),
        }
    }
}

/// Reads and parses a variable, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}
