//! Process settings loaded from `sitewatch.toml`.
//!
//! Instance and target configuration lives in the database; this file only
//! carries process-level knobs: listen address, data root, and the global
//! alert-escalation defaults that instances can override per row.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::constants::alerts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the SQLite file and protector key material.
    #[serde(default = "default_data_root")]
    pub data_root: String,
    #[serde(default)]
    pub alerting: AlertingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingSettings {
    #[serde(default = "default_down_after")]
    pub down_after_seconds: i64,
    #[serde(default = "default_recovered_after")]
    pub recovered_after_seconds: i64,
    #[serde(default = "default_repeat_under_24h")]
    pub repeat_every_seconds_under_24h: i64,
    #[serde(default = "default_repeat_24h_to_72h")]
    pub repeat_every_seconds_24h_to_72h: i64,
    #[serde(default = "default_daily_after_hours")]
    pub daily_after_hours: i64,
    #[serde(default = "default_daily_hour")]
    pub daily_hour_local: u32,
    #[serde(default = "default_daily_minute")]
    pub daily_minute_local: u32,
    #[serde(default = "default_tick_seconds")]
    pub scheduler_tick_seconds: u64,
    /// Base URL prefixed onto dashboard links in notification bodies.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8095
}

fn default_data_root() -> String {
    "data".to_string()
}

fn default_down_after() -> i64 {
    alerts::DOWN_AFTER_SECONDS
}

fn default_recovered_after() -> i64 {
    alerts::RECOVERED_AFTER_SECONDS
}

fn default_repeat_under_24h() -> i64 {
    alerts::REPEAT_EVERY_SECONDS_UNDER_24H
}

fn default_repeat_24h_to_72h() -> i64 {
    alerts::REPEAT_EVERY_SECONDS_24H_TO_72H
}

fn default_daily_after_hours() -> i64 {
    alerts::DAILY_AFTER_HOURS
}

fn default_daily_hour() -> u32 {
    alerts::DAILY_HOUR_LOCAL
}

fn default_daily_minute() -> u32 {
    alerts::DAILY_MINUTE_LOCAL
}

fn default_tick_seconds() -> u64 {
    alerts::SCHEDULER_TICK_SECONDS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_root: default_data_root(),
            alerting: AlertingSettings::default(),
        }
    }
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            down_after_seconds: default_down_after(),
            recovered_after_seconds: default_recovered_after(),
            repeat_every_seconds_under_24h: default_repeat_under_24h(),
            repeat_every_seconds_24h_to_72h: default_repeat_24h_to_72h(),
            daily_after_hours: default_daily_after_hours(),
            daily_hour_local: default_daily_hour(),
            daily_minute_local: default_daily_minute(),
            scheduler_tick_seconds: default_tick_seconds(),
            public_base_url: None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. A missing file is not an error; the
    /// process runs on defaults so a bare checkout starts cleanly.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Settings file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

        info!("Settings loaded from {:?}", path);
        Ok(settings)
    }
}
