use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::recurrence::RecurrenceRule;
use crate::error::ValidationError;

/// Wall-clock time an alarm rings at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub const fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    /// `None` when hour or minute is out of range.
    pub fn to_naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let time = NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map_err(|e| ValidationError::invalid("time_of_day", format!("'{s}': {e}")))?;
        Ok(Self::new(time.hour() as u8, time.minute() as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnoozeMode {
    #[default]
    Off,
    On,
    /// Snooze, and raise the volume a step on every repeat.
    VolumeRampUp,
}

impl SnoozeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SnoozeMode::Off => "off",
            SnoozeMode::On => "on",
            SnoozeMode::VolumeRampUp => "volume-ramp-up",
        }
    }
}

impl FromStr for SnoozeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(SnoozeMode::Off),
            "on" => Ok(SnoozeMode::On),
            "volume-ramp-up" | "ramp" => Ok(SnoozeMode::VolumeRampUp),
            other => Err(ValidationError::invalid(
                "snooze.mode",
                format!("unknown mode '{other}' (expected off, on, volume-ramp-up)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeSettings {
    pub mode: SnoozeMode,
    pub length_minutes: u32,
    pub max_repeats: u32,
}

impl Default for SnoozeSettings {
    fn default() -> Self {
        Self {
            mode: SnoozeMode::Off,
            length_minutes: 10,
            max_repeats: 5,
        }
    }
}

impl SnoozeSettings {
    pub fn is_enabled(&self) -> bool {
        self.mode != SnoozeMode::Off
    }
}

/// What the audio collaborator should play.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackRef {
    /// Built-in alarm tone.
    #[default]
    Default,
    File { path: PathBuf },
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRef::Default => f.write_str("default tone"),
            TrackRef::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// One user-defined alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub id: i64,
    pub enabled: bool,
    pub title: String,
    pub recurrence: RecurrenceRule,
    pub time_of_day: TimeOfDay,
    /// Base volume, 0..=100.
    pub music_volume: u8,
    /// How long the alarm rings before it stops on its own.
    pub duration_seconds: u32,
    pub snooze: SnoozeSettings,
    #[serde(default)]
    pub track: TrackRef,
    #[serde(default)]
    pub vibrate: bool,
    #[serde(default)]
    pub speak: bool,
}

impl AlarmConfig {
    /// A disabled daily alarm at midnight with the stock settings.
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            enabled: false,
            title: title.into(),
            recurrence: RecurrenceRule::Daily,
            time_of_day: TimeOfDay::new(0, 0),
            music_volume: 100,
            duration_seconds: 300,
            snooze: SnoozeSettings::default(),
            track: TrackRef::Default,
            vibrate: false,
            speak: false,
        }
    }

    /// Reject values the lifecycle cannot honour.
    ///
    /// An empty day set is allowed; such an alarm simply never fires.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.time_of_day.to_naive_time().is_none() {
            return Err(ValidationError::invalid(
                "time_of_day",
                format!("{} is not a valid time", self.time_of_day),
            ));
        }
        if self.music_volume > 100 {
            return Err(ValidationError::invalid(
                "music_volume",
                format!("{} exceeds 100", self.music_volume),
            ));
        }
        if self.duration_seconds == 0 {
            return Err(ValidationError::invalid(
                "duration_seconds",
                "must be at least one second",
            ));
        }
        if self.snooze.is_enabled() && self.snooze.length_minutes == 0 {
            return Err(ValidationError::invalid(
                "snooze.length_minutes",
                "must be at least one minute while snooze is on",
            ));
        }
        if let RecurrenceRule::Once { year, month, day } = self.recurrence {
            if chrono::NaiveDate::from_ymd_opt(year, month, day).is_none() {
                return Err(ValidationError::invalid(
                    "recurrence",
                    format!("{year:04}-{month:02}-{day:02} is not a calendar date"),
                ));
            }
        }
        Ok(())
    }
}
