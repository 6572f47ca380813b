//! Application configuration.
//!
//! The binary fills these structures from the environment; libraries only
//! consume them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Audit pipeline configuration.
    pub audit: AuditConfig,
    /// Cryptographic configuration.
    pub crypto: CryptoConfig,
}

/// Audit pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Delay between the end of one changelog pass and the start of the next (ms).
    pub changelog_poll_interval_ms: u64,
    /// Grace delay before the first changelog pass (ms).
    pub changelog_initial_delay_ms: u64,
    /// Maximum changelog entries read per source per pass.
    pub changelog_max_entries: i32,
    /// Connect timeout for changelog connections (seconds).
    pub changelog_connect_timeout_secs: u64,
    /// Response timeout for changelog searches (seconds).
    pub changelog_response_timeout_secs: u64,
    /// Capacity of the internal audit queue.
    pub queue_capacity: usize,
    /// Number of background audit workers.
    pub workers: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            changelog_poll_interval_ms: 60_000,
            changelog_initial_delay_ms: 15_000,
            changelog_max_entries: 500,
            changelog_connect_timeout_secs: 10,
            changelog_response_timeout_secs: 30,
            queue_capacity: 1024,
            workers: 2,
        }
    }
}

impl AuditConfig {
    /// Returns the changelog poll period.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.changelog_poll_interval_ms)
    }

    /// Returns the changelog startup delay.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.changelog_initial_delay_ms)
    }

    /// Returns the changelog connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.changelog_connect_timeout_secs)
    }

    /// Returns the changelog response timeout.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.changelog_response_timeout_secs)
    }
}

/// Cryptographic configuration.
///
/// ## Security
///
/// `encryption_key` is a Base64-encoded 256-bit AES key. It is never
/// serialized back out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Base64-encoded AES-256 key used for stored bind credentials.
    #[serde(skip_serializing)]
    pub encryption_key: String,
}
