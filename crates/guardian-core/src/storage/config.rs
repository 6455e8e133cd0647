//! TOML-based service configuration.
//!
//! Stores:
//! - Feed collection and subscription window
//! - Notification language and auto-dismiss timeout
//! - Haptic escalation settings
//! - Reconciliation job cadence
//!
//! Configuration is stored at `~/.config/guardian/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::alert::Locale;
use crate::error::ConfigError;
use crate::reconcile::{PeriodicRequest, JOB_NAME};
use crate::supervisor::SupervisorSettings;

/// Alert feed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Alerts older than this are neither fetched nor delivered.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Vibration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HapticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hard stop for every vibration, repeating or not.
    #[serde(default = "default_cutoff_ms")]
    pub cutoff_ms: u64,
    #[serde(default)]
    pub repeat: bool,
}

/// Periodic reconciliation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_job_name")]
    pub job_name: String,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_initial_delay_minutes")]
    pub initial_delay_minutes: u64,
}

/// Service configuration.
///
/// Serialized to/from TOML at `~/.config/guardian/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub haptics: HapticsConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

// Default functions
fn default_collection() -> String {
    crate::stream::DEFAULT_COLLECTION.into()
}
fn default_window_minutes() -> u32 {
    60
}
fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    crate::policy::DEFAULT_TIMEOUT_MS
}
fn default_cutoff_ms() -> u64 {
    7_000
}
fn default_job_name() -> String {
    JOB_NAME.into()
}
fn default_interval_minutes() -> u64 {
    15
}
fn default_initial_delay_minutes() -> u64 {
    1
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            window_minutes: default_window_minutes(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            locale: Locale::default(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cutoff_ms: default_cutoff_ms(),
            repeat: false,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            job_name: default_job_name(),
            interval_minutes: default_interval_minutes(),
            initial_delay_minutes: default_initial_delay_minutes(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current
                    .get_mut(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                continue;
            }

            let obj = current
                .as_object_mut()
                .ok_or_else(|| format!("unknown config key: {key}"))?;
            let existing = obj
                .get(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                serde_json::Value::Number(_) => serde_json::Value::Number(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("cannot parse '{value}' as a whole number"))?
                        .into(),
                ),
                serde_json::Value::Object(_) => {
                    return Err(format!("{key} is a section, set one of its keys").into());
                }
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(format!("unknown config key: {key}").into())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/guardian"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if nothing exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. The result is validated
    /// before it replaces `self`; nothing is written to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value).map_err(|e| invalid(e.to_string()))?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.collection.trim().is_empty() {
            return Err(ConfigError::MissingKey("feed.collection".into()));
        }
        if self.feed.window_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "feed.window_minutes".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.reconciliation.interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "reconciliation.interval_minutes".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.reconciliation.job_name.trim().is_empty() {
            return Err(ConfigError::MissingKey("reconciliation.job_name".into()));
        }
        Ok(())
    }

    /// Flattened key/value pairs, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            flatten("", &json, &mut out);
        }
        out.sort();
        out
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            collection: self.feed.collection.clone(),
            window: chrono::Duration::minutes(i64::from(self.feed.window_minutes)),
            locale: self.notifications.locale,
            notifications_enabled: self.notifications.enabled,
            timeout_ms: self.notifications.timeout_ms,
            haptics_enabled: self.haptics.enabled,
            vibration_cutoff: Duration::from_millis(self.haptics.cutoff_ms),
            repeat_waveform: self.haptics.repeat,
            ..SupervisorSettings::default()
        }
    }

    pub fn reconciliation_request(&self) -> PeriodicRequest {
        PeriodicRequest::new(
            self.reconciliation.job_name.clone(),
            Duration::from_secs(self.reconciliation.interval_minutes.saturating_mul(60)),
            Duration::from_secs(self.reconciliation.initial_delay_minutes.saturating_mul(60)),
        )
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}
