//! TOML-based daemon configuration.
//!
//! Holds:
//! - Source and target store locations
//! - The activity predicate applied to source rows
//! - Sync interval, tag id, association discriminator and timeouts
//! - Default log filter
//!
//! The default location is `~/.config/rostersync/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use super::source_db::{ActivityBoundary, ActivityPredicate};
use crate::error::ConfigError;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "ROSTERSYNC_CONFIG";

const MAX_INTERVAL_MINUTES: u64 = 525_600;
const MAX_RUN_TIMEOUT_SECS: u64 = 86_400;
/// SQLite takes the busy timeout in milliseconds as a C int.
const MAX_STORE_TIMEOUT_SECS: u64 = 3_600;

/// Source store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub boundary: ActivityBoundary,
    #[serde(default)]
    pub grace_minutes: u32,
}

/// Target store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_target_path")]
    pub path: PathBuf,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Tag attached to every member the engine creates.
    #[serde(default = "default_tag_id")]
    pub tag_id: i64,
    /// Discriminator stored in `taggables.taggable_type`.
    #[serde(default = "default_subject_type")]
    pub subject_type: String,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// SQLite busy timeout for both stores.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

/// Logging settings. `RUST_LOG` takes precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

// Default functions
fn default_source_path() -> PathBuf {
    data_dir().join("source.db")
}
fn default_target_path() -> PathBuf {
    data_dir().join("target.db")
}
fn default_interval_minutes() -> u64 {
    15
}
fn default_tag_id() -> i64 {
    1
}
fn default_subject_type() -> String {
    "Robert2\\API\\Models\\Person".into()
}
fn default_run_timeout_secs() -> u64 {
    300
}
fn default_store_timeout_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            boundary: ActivityBoundary::default(),
            grace_minutes: 0,
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            path: default_target_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            tag_id: default_tag_id(),
            subject_type: default_subject_type(),
            run_timeout_secs: default_run_timeout_secs(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SourceConfig {
    pub fn predicate(&self) -> ActivityPredicate {
        ActivityPredicate {
            boundary: self.boundary,
            grace_minutes: self.grace_minutes,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
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
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<i64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("not a leaf key".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.toml")
    }

    /// Resolve the config file: explicit flag, then `ROSTERSYNC_CONFIG`, then
    /// the default location.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_path(),
        }
    }

    /// Parse a config file. Store paths are kept as written; see
    /// [`Config::resolve_store_paths`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: Config = toml::from_str(&content)?;
        Ok(cfg)
    }

    /// Take relative store paths relative to the directory of `config_path`.
    /// Call before opening stores, never before [`Config::save_to`].
    pub fn resolve_store_paths(&mut self, config_path: &Path) {
        if let Some(dir) = config_path.parent() {
            self.source.path = anchor(dir, &self.source.path);
            self.target.path = anchor(dir, &self.target.path);
        }
    }

    /// Load from `path`, writing the default config there when the file is
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load_from(path);
        }
        let cfg = Self::default();
        cfg.save_to(path)?;
        Ok(cfg)
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Reject values the daemon cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first invalid key found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        if self.sync.interval_minutes == 0 {
            return invalid("sync.interval_minutes", "must be greater than zero");
        }
        if self.sync.interval_minutes > MAX_INTERVAL_MINUTES {
            return invalid("sync.interval_minutes", "must be at most 525600 (one year)");
        }
        if self.sync.run_timeout_secs == 0 {
            return invalid("sync.run_timeout_secs", "must be greater than zero");
        }
        if self.sync.run_timeout_secs > MAX_RUN_TIMEOUT_SECS {
            return invalid("sync.run_timeout_secs", "must be at most 86400 (one day)");
        }
        if self.sync.store_timeout_secs > MAX_STORE_TIMEOUT_SECS {
            return invalid("sync.store_timeout_secs", "must be at most 3600");
        }
        if self.sync.subject_type.is_empty() {
            return invalid("sync.subject_type", "must not be empty");
        }
        if self.source.path.as_os_str().is_empty() {
            return invalid("source.path", "must not be empty");
        }
        if self.target.path.as_os_str().is_empty() {
            return invalid("target.path", "must not be empty");
        }
        if self.source.path == self.target.path {
            return invalid("target.path", "must differ from source.path");
        }
        Ok(())
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

    /// Set a config value by key. The result is validated before it replaces
    /// `self`; nothing is written to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

fn anchor(dir: &Path, path: &Path) -> PathBuf {
    if path.is_relative() && !dir.as_os_str().is_empty() {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}
