//! Bot configuration: `~/.bdaybot/config.toml` plus environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BdayError, Result};
use crate::traits::store::DEFAULT_MAX_RECORDS_PER_GROUP;

/// Environment variables that override file values.
pub const ENV_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
pub const ENV_DEBUG: &str = "DEBUG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Long-poll timeout for getUpdates.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "memory".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_records")]
    pub max_records_per_group: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
    #[serde(default = "default_lookahead")]
    pub lookahead_days: u32,
    /// Max distance from the configured notify time that still counts as due.
    #[serde(default = "default_due_window")]
    pub due_window_secs: u64,
    /// Deadline for each store or transport call made by a tick.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Remember the last notified date per group and send at most once a day.
    #[serde(default = "default_true")]
    pub dedup_daily: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long an add/delete prompt waits for the user's reply.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

fn default_true() -> bool { true }
fn default_api_url() -> String { "https://api.telegram.org".into() }
fn default_poll_timeout() -> u64 { 60 }
fn default_backend() -> String { "sqlite".into() }
fn default_db_path() -> String { "~/.bdaybot/birthdays.db".into() }
fn default_max_records() -> usize { DEFAULT_MAX_RECORDS_PER_GROUP }
fn default_tick() -> u64 { 60 }
fn default_lookahead() -> u32 { 7 }
fn default_due_window() -> u64 { 60 }
fn default_call_timeout() -> u64 { 10 }
fn default_session_ttl() -> u64 { 300 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
            max_records_per_group: default_max_records(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_tick(),
            lookahead_days: default_lookahead(),
            due_window_secs: default_due_window(),
            call_timeout_secs: default_call_timeout(),
            dedup_daily: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: default_session_ttl() }
    }
}

impl BotConfig {
    /// `~/.bdaybot`
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bdaybot")
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load from the default path (defaults if the file is missing), then
    /// apply `.env` and environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            Self::read_file(&path)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        dotenvy::dotenv().ok();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        dotenvy::dotenv().ok();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BdayError::config(format!("Cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| BdayError::config(format!("Invalid config {}: {e}", path.display())))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BdayError::config(format!("Serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override file values from `TELEGRAM_BOT_TOKEN`, `DATABASE_PATH`, `DEBUG`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token.trim().to_string();
        }
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|p| !p.trim().is_empty()) {
            self.storage.path = path;
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            self.debug = debug.eq_ignore_ascii_case("true") || debug == "1";
        }
    }

    /// Database path with `~` and env vars expanded.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.storage.path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| self.storage.path.clone()))
    }

    /// Settings the Telegram transport cannot run without.
    pub fn validate_for_telegram(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(BdayError::config(format!(
                "Bot token is not set ({ENV_TOKEN} or [telegram].bot_token)"
            )));
        }
        if self.scheduler.tick_secs == 0 {
            return Err(BdayError::config("scheduler.tick_secs must be positive"));
        }
        Ok(())
    }
}
