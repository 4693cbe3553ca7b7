//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Holiday calendar used for rest-day rules
//! - Template values for newly created alarms
//! - Runtime limits for the daemon
//! - Log filter
//!
//! Configuration is stored at `~/.config/wakeup/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::alarm::{AlarmConfig, RecurrenceResolver, SnoozeMode, SnoozeSettings};
use crate::calendar::HolidayCalendar;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub holidays: HolidayCalendar,
}

/// Values copied into every new alarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_volume")]
    pub music_volume: u8,
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u32,
    #[serde(default)]
    pub snooze_mode: SnoozeMode,
    #[serde(default = "default_snooze_length")]
    pub snooze_length_minutes: u32,
    #[serde(default = "default_snooze_repeats")]
    pub snooze_max_repeats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long firing waits for background preparation.
    #[serde(default = "default_preparation_timeout")]
    pub preparation_timeout_secs: u64,
    /// Alarm slots created on first run.
    #[serde(default = "default_seed_count")]
    pub seed_alarm_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/wakeup/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_volume() -> u8 {
    100
}
fn default_duration_seconds() -> u32 {
    300
}
fn default_snooze_length() -> u32 {
    10
}
fn default_snooze_repeats() -> u32 {
    5
}
fn default_preparation_timeout() -> u64 {
    30
}
fn default_seed_count() -> u32 {
    12
}
fn default_filter() -> String {
    "info".into()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            music_volume: default_volume(),
            duration_seconds: default_duration_seconds(),
            snooze_mode: SnoozeMode::Off,
            snooze_length_minutes: default_snooze_length(),
            snooze_max_repeats: default_snooze_repeats(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            preparation_timeout_secs: default_preparation_timeout(),
            seed_alarm_count: default_seed_count(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
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
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
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
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("only leaf values can be set".into()));
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

    /// `<data_dir>/config.toml`
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults when the file is
    /// missing.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
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

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
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

    /// Set a value by dot-separated key. The result must still be a valid
    /// configuration, otherwise `self` is left untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.music_volume > 100 {
            return Err(ConfigError::InvalidValue {
                key: "defaults.music_volume".into(),
                message: format!("{} exceeds 100", self.defaults.music_volume),
            });
        }
        if self.defaults.duration_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "defaults.duration_seconds".into(),
                message: "must be at least one second".into(),
            });
        }
        Ok(())
    }

    pub fn resolver(&self) -> RecurrenceResolver {
        RecurrenceResolver::new(self.calendar.holidays)
    }

    pub fn preparation_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.preparation_timeout_secs)
    }

    /// A new disabled alarm carrying the configured defaults.
    pub fn alarm_template(&self, id: i64, title: impl Into<String>) -> AlarmConfig {
        let mut alarm = AlarmConfig::new(id, title);
        alarm.music_volume = self.defaults.music_volume;
        alarm.duration_seconds = self.defaults.duration_seconds;
        alarm.snooze = SnoozeSettings {
            mode: self.defaults.snooze_mode,
            length_minutes: self.defaults.snooze_length_minutes,
            max_repeats: self.defaults.snooze_max_repeats,
        };
        alarm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.calendar.holidays, HolidayCalendar::SundaysOnly);
        assert_eq!(parsed.defaults.music_volume, 100);
        assert_eq!(parsed.runtime.seed_alarm_count, 12);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[calendar]\nholidays = \"japan\"\n").unwrap();
        assert_eq!(parsed.calendar.holidays, HolidayCalendar::Japan);
        assert_eq!(parsed.defaults.snooze_length_minutes, 10);
        assert_eq!(parsed.logging.filter, "info");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("calendar.holidays").as_deref(), Some("sundays-only"));
        assert_eq!(cfg.get("defaults.duration_seconds").as_deref(), Some("300"));
        assert!(cfg.get("defaults.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_enum_and_number() {
        let mut cfg = Config::default();
        cfg.set("calendar.holidays", "japan").unwrap();
        cfg.set("defaults.snooze_mode", "volume-ramp-up").unwrap();
        cfg.set("runtime.preparation_timeout_secs", "5").unwrap();
        assert_eq!(cfg.calendar.holidays, HolidayCalendar::Japan);
        assert_eq!(cfg.defaults.snooze_mode, SnoozeMode::VolumeRampUp);
        assert_eq!(cfg.preparation_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("defaults.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("defaults", "1"), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn set_rejects_invalid_values_and_keeps_state() {
        let mut cfg = Config::default();
        assert!(cfg.set("calendar.holidays", "moon").is_err());
        assert!(cfg.set("defaults.music_volume", "101").is_err());
        assert!(cfg.set("defaults.music_volume", "loud").is_err());
        assert_eq!(cfg.defaults.music_volume, 100);
        assert_eq!(cfg.calendar.holidays, HolidayCalendar::SundaysOnly);
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.runtime.preparation_timeout_secs, 30);

        let mut cfg = cfg;
        cfg.set("defaults.music_volume", "40").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().defaults.music_volume, 40);
    }

    #[test]
    fn load_from_broken_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "calendar = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }

    #[test]
    fn alarm_template_uses_defaults() {
        let mut cfg = Config::default();
        cfg.set("defaults.snooze_mode", "on").unwrap();
        cfg.set("defaults.snooze_max_repeats", "3").unwrap();
        let alarm = cfg.alarm_template(4, "Alarm 4");
        assert!(!alarm.enabled);
        assert_eq!(alarm.snooze.mode, SnoozeMode::On);
        assert_eq!(alarm.snooze.max_repeats, 3);
        assert_eq!(alarm.duration_seconds, 300);
    }
}
