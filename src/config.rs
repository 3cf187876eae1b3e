//! Crate configuration: retry policy, polling cadence, and ledger limits.

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_TX_BYTES;
use crate::driver::retry::RetryConfig;

/// Tunables for resolution, serialization, and the execution driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtbConfig {
    /// Backoff policy for transient RPC failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Delay between confirmation polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Confirmation polls before giving up on a pending digest
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Ledger maximum for a serialized block, in bytes
    #[serde(default = "default_max_tx_bytes")]
    pub max_tx_bytes: usize,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_max_poll_attempts() -> u32 {
    30
}
fn default_max_tx_bytes() -> usize {
    DEFAULT_MAX_TX_BYTES
}

impl Default for PtbConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            max_tx_bytes: default_max_tx_bytes(),
        }
    }
}

impl PtbConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PtbConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_policy() {
        let config = PtbConfig::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_backoff_ms, 500);
        assert_eq!(config.max_tx_bytes, 128 * 1024);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: PtbConfig = toml::from_str(
            r#"
            poll_interval_ms = 250

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_backoff_ms, 500);
        assert_eq!(config.max_poll_attempts, 30);
    }
}
