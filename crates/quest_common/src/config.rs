//! Configuration management.
//!
//! Loads settings from `$QUESTD_CONFIG`, /etc/questd/config.toml or
//! /var/lib/questd/config.toml, falling back to built-in defaults.

use crate::catalogue::Catalogue;
use crate::clock::Clock;
use crate::error::{QuestError, QuestResult};
use crate::ladder::Ladder;
use crate::store::DbLocation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "QUESTD_CONFIG";

/// Config file path
pub const CONFIG_PATH: &str = "/etc/questd/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/questd/config.toml";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7870";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// HTTP command surface address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// SQLite file; the system location when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            db_path: None,
        }
    }
}

impl DaemonConfig {
    pub fn db_location(&self) -> DbLocation {
        match &self.db_path {
            Some(path) => DbLocation::Custom(path.clone()),
            None => DbLocation::System,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Community time zone as minutes east of UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_tick_secs() -> u64 {
    300 // 5 minutes
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bridge endpoint receiving side effects; log only when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Per-delivery timeout
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,
}

fn default_dispatch_timeout() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_dispatch_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local hour (0-23) from which the reminder may go out
    #[serde(default = "default_reminder_hour")]
    pub hour: u32,

    #[serde(default = "default_reminder_message")]
    pub message: String,
}

fn default_true() -> bool {
    true
}

fn default_reminder_hour() -> u32 {
    18
}

fn default_reminder_message() -> String {
    "There is still time to complete today's quests!".to_string()
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            hour: default_reminder_hour(),
            message: default_reminder_message(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsConfig {
    /// Hold claims for moderator approval before granting XP
    #[serde(default)]
    pub require_approval: bool,
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub claims: ClaimsConfig,
    #[serde(default)]
    pub ladder: Ladder,
    #[serde(default)]
    pub catalogue: Catalogue,
}

impl QuestConfig {
    /// Load config from the first readable location, or defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            match Self::load_from_path(&path) {
                Ok(config) => return config,
                Err(e) => warn!("Config at {} unusable: {:#}", path, e),
            }
        }

        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {:#}", e);
                QuestConfig::default()
            })
    }

    /// Parse and validate one file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: QuestConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> QuestResult<()> {
        self.daemon.listen_addr.parse::<SocketAddr>().map_err(|_| {
            QuestError::validation(format!(
                "listen_addr '{}' is not a socket address",
                self.daemon.listen_addr
            ))
        })?;
        self.clock()?;

        if self.scheduler.tick_secs == 0 {
            return Err(QuestError::validation("scheduler.tick_secs must be positive"));
        }
        if self.dispatch.timeout_secs == 0 {
            return Err(QuestError::validation("dispatch.timeout_secs must be positive"));
        }
        if let Some(url) = &self.dispatch.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(QuestError::validation(format!(
                    "webhook_url '{}' must be an http(s) URL",
                    url
                )));
            }
        }
        if self.reminders.hour > 23 {
            return Err(QuestError::validation("reminders.hour must be between 0 and 23"));
        }

        self.ladder.validate()?;
        self.catalogue.validate(&self.ladder)?;
        Ok(())
    }

    pub fn clock(&self) -> QuestResult<Clock> {
        Clock::new(self.clock.utc_offset_minutes)
    }
}
