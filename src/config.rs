//! Engine configuration
//! Core Principle: Defaults, then a JSON file, then the environment; later sources win

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GroupPolicyError, Result};
use crate::gpo::{SaveRetryPolicy, DEFAULT_SAVE_RETRY_COUNT};

pub const ENV_SAVE_RETRY_COUNT: &str = "ADMX_POLICY_SAVE_RETRY_COUNT";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "ADMX_POLICY_RETRY_BASE_DELAY_MS";
pub const ENV_USE_CRITICAL_SECTION: &str = "ADMX_POLICY_USE_CRITICAL_SECTION";
pub const ENV_LOG: &str = "ADMX_POLICY_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub save_retry_count: u32,
    /// Linear backoff unit: attempt `n` waits `n * retry_base_delay_ms`.
    pub retry_base_delay_ms: u64,
    pub use_critical_policy_section: bool,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            save_retry_count: DEFAULT_SAVE_RETRY_COUNT,
            retry_base_delay_ms: 1000,
            use_critical_policy_section: false,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the environment.
    pub fn load() -> Result<Self> {
        let mut config = EngineConfig::default();
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// File values overridden by the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_json_file(path)?;
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| GroupPolicyError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SAVE_RETRY_COUNT) {
            self.save_retry_count = parse_var(ENV_SAVE_RETRY_COUNT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_BASE_DELAY_MS) {
            self.retry_base_delay_ms = parse_var(ENV_RETRY_BASE_DELAY_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_USE_CRITICAL_SECTION) {
            self.use_critical_policy_section = parse_flag(ENV_USE_CRITICAL_SECTION, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LOG) {
            self.log_filter = raw;
        }
        Ok(())
    }

    /// Save retry policy for a call; `None` uses the configured count.
    pub fn retry_policy(&self, retry_count: Option<u32>) -> SaveRetryPolicy {
        SaveRetryPolicy::new(retry_count.unwrap_or(self.save_retry_count))
            .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| GroupPolicyError::Config(format!("{name} has an invalid value '{raw}'")))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(GroupPolicyError::Config(format!("{name} has an invalid value '{raw}'"))),
    }
}
