//! Connection and retry configuration.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`GRAPHMAP__NEBULA__HOST`, ...)
//! 2. Config file (`graphmap.toml`, `[nebula]` section)
//! 3. Defaults

use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};

/// Connection settings for the graph service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Upper bound on sessions checked out at the same time.
    #[serde(default = "default_pool_size")]
    pub max_connection_pool_size: usize,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long `session()` waits for a free pool slot.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Per-statement timeout. `None` waits indefinitely.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9669
}

fn default_username() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "nebula".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: default_password(),
            max_connection_pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            statement_timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl GraphConfig {
    /// Load from `<file_prefix>.toml` (optional) overlaid by `GRAPHMAP__` env vars.
    pub fn load(file_prefix: &str) -> Result<Self> {
        Self::from_builder(
            config::Config::builder()
                .add_source(File::with_name(file_prefix).required(false))
                .add_source(
                    Environment::with_prefix("GRAPHMAP")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    /// Parse a TOML document carrying a `[nebula]` section.
    pub fn from_toml(text: &str) -> Result<Self> {
        Self::from_builder(
            config::Config::builder().add_source(File::from_str(text, FileFormat::Toml)),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let cfg = builder
            .build()
            .map_err(|e| MappingError::Config(e.to_string()))?;
        match cfg.get::<GraphConfig>("nebula") {
            Ok(c) => Ok(c),
            Err(ConfigError::NotFound(_)) => Ok(GraphConfig::default()),
            Err(e) => Err(MappingError::Config(e.to_string())),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }
}

/// Bounded exponential backoff for server-reported write failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 behave as 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.saturating_sub(1));
        let mut millis = self.initial_delay_ms.saturating_mul(factor);
        if let Some(cap) = self.max_delay_ms {
            millis = millis.min(cap);
        }
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert_eq!(config.address(), "127.0.0.1:9669");
        assert_eq!(config.username, "root");
        assert_eq!(config.max_connection_pool_size, 10);
        assert_eq!(config.statement_timeout(), None);
        assert_eq!(config.retry.max_attempts, 10);
    }

    #[test]
    fn test_toml_overrides_and_defaults() {
        let config = GraphConfig::from_toml(
            r#"
            [nebula]
            host = "192.168.3.70"
            port = 32113
            statement_timeout_ms = 2500

            [nebula.retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.address(), "192.168.3.70:32113");
        assert_eq!(config.password, "nebula");
        assert_eq!(config.statement_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 1_000);
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let config = GraphConfig::from_toml("[other]\nkey = 1\n").unwrap();
        assert_eq!(config, GraphConfig::default());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(9), Duration::from_secs(256));

        let capped = RetryPolicy {
            max_delay_ms: Some(5_000),
            ..RetryPolicy::default()
        };
        assert_eq!(capped.delay_after(10), Duration::from_secs(5));
        assert_eq!(capped.delay_after(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_none_policy_has_one_attempt() {
        assert_eq!(RetryPolicy::none().attempts(), 1);
        let zero = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(zero.attempts(), 1);
    }
}
