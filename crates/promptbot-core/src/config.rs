//! Configuration — YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_WELCOME_BACK: &str = "Welcome back!  Let's start over from the beginning.";
pub const DEFAULT_GREETING: &str = "Hi";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Idle time after which a returning conversation starts over
    #[serde(default = "default_conversation_timeout")]
    pub conversation_timeout_seconds: u64,

    /// How often the sweeper looks for idle tracker records
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// How long an idle record is kept before eviction (default: 2x timeout)
    #[serde(default)]
    pub record_retention_seconds: Option<u64>,

    /// Notice sent when an idle conversation is reset
    #[serde(default = "default_welcome_back")]
    pub welcome_back_message: String,

    /// Sent once per member added to a conversation (other than the bot)
    #[serde(default = "default_greeting")]
    pub greeting_message: String,
}

fn default_conversation_timeout() -> u64 {
    1800
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_welcome_back() -> String {
    DEFAULT_WELCOME_BACK.into()
}
fn default_greeting() -> String {
    DEFAULT_GREETING.into()
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config.yaml")?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `config_path` if it exists, otherwise defaults. Env overrides apply either way.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.is_file() {
            return Self::load(config_path);
        }
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("PROMPTBOT_CONVERSATION_TIMEOUT_SECONDS") {
            self.conversation_timeout_seconds = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid PROMPTBOT_CONVERSATION_TIMEOUT_SECONDS: {}", v))?;
        }
        if let Ok(v) = std::env::var("PROMPTBOT_SWEEP_INTERVAL_SECONDS") {
            self.sweep_interval_seconds = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid PROMPTBOT_SWEEP_INTERVAL_SECONDS: {}", v))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sweep_interval_seconds == 0 {
            anyhow::bail!("sweep_interval_seconds must be greater than zero");
        }
        if let Some(retention) = self.record_retention_seconds {
            if retention < self.conversation_timeout_seconds {
                anyhow::bail!(
                    "record_retention_seconds ({}) must not be shorter than conversation_timeout_seconds ({})",
                    retention,
                    self.conversation_timeout_seconds
                );
            }
        }
        Ok(())
    }

    /// Effective retention window for tracker records.
    pub fn retention_seconds(&self) -> u64 {
        self.record_retention_seconds
            .unwrap_or_else(|| self.conversation_timeout_seconds.saturating_mul(2))
            .max(self.conversation_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            conversation_timeout_seconds: default_conversation_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
            record_retention_seconds: None,
            welcome_back_message: default_welcome_back(),
            greeting_message: default_greeting(),
        }
    }
}
