use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings for the synchronization core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Interval of fallback polling while the change feed is not live.
    pub poll_interval_ms: u64,
    /// How long to wait for the change feed to confirm before polling.
    pub connect_timeout_ms: u64,
    /// SQLite file for the local gateway. In-memory when absent.
    pub database_path: Option<String>,
    /// Default tracing filter, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            connect_timeout_ms: 10_000,
            database_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
