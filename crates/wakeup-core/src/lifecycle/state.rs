use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const KEY_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Token identifying one arming of the dispatcher.
///
/// Rendered as `yyyyMMddHHmmss#generation`. The generation grows on every
/// re-arm so arming twice for the same instant still yields distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EpochKey {
    fire_at: NaiveDateTime,
    generation: u64,
}

impl EpochKey {
    pub fn new(fire_at: NaiveDateTime, generation: u64) -> Self {
        Self {
            fire_at,
            generation,
        }
    }

    /// Key for `fire_at` that supersedes `previous`.
    pub fn next(fire_at: NaiveDateTime, previous: Option<&EpochKey>) -> Self {
        let generation = previous.map_or(1, |k| k.generation.wrapping_add(1));
        Self::new(fire_at, generation)
    }

    pub fn fire_at(&self) -> NaiveDateTime {
        self.fire_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for EpochKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}",
            self.fire_at.format(KEY_TIME_FORMAT),
            self.generation
        )
    }
}

impl FromStr for EpochKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stamp, generation) = s
            .split_once('#')
            .ok_or_else(|| ValidationError::invalid("epoch_key", format!("'{s}' has no generation")))?;
        let fire_at = NaiveDateTime::parse_from_str(stamp, KEY_TIME_FORMAT)
            .map_err(|e| ValidationError::invalid("epoch_key", format!("'{s}': {e}")))?;
        let generation = generation
            .parse()
            .map_err(|e| ValidationError::invalid("epoch_key", format!("'{s}': {e}")))?;
        Ok(Self::new(fire_at, generation))
    }
}

impl TryFrom<String> for EpochKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EpochKey> for String {
    fn from(key: EpochKey) -> Self {
        key.to_string()
    }
}

/// Where the single alarm timeline currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Armed {
        alarm_id: i64,
        fire_at: NaiveDateTime,
        epoch_key: EpochKey,
    },
    Firing {
        alarm_id: i64,
        epoch_key: EpochKey,
    },
    SnoozeCountdown {
        alarm_id: i64,
        fire_at: NaiveDateTime,
        epoch_key: EpochKey,
        remaining_repeats: u32,
    },
}

impl LifecycleState {
    pub fn alarm_id(&self) -> Option<i64> {
        match self {
            LifecycleState::Idle => None,
            LifecycleState::Armed { alarm_id, .. }
            | LifecycleState::Firing { alarm_id, .. }
            | LifecycleState::SnoozeCountdown { alarm_id, .. } => Some(*alarm_id),
        }
    }

    pub fn epoch_key(&self) -> Option<&EpochKey> {
        match self {
            LifecycleState::Idle => None,
            LifecycleState::Armed { epoch_key, .. }
            | LifecycleState::Firing { epoch_key, .. }
            | LifecycleState::SnoozeCountdown { epoch_key, .. } => Some(epoch_key),
        }
    }

    /// Next scheduled wake-up, if one is pending.
    pub fn fire_at(&self) -> Option<NaiveDateTime> {
        match self {
            LifecycleState::Armed { fire_at, .. }
            | LifecycleState::SnoozeCountdown { fire_at, .. } => Some(*fire_at),
            _ => None,
        }
    }

    /// Ringing or snoozed: the wake resource is held.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LifecycleState::Firing { .. } | LifecycleState::SnoozeCountdown { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Armed { .. } => "armed",
            LifecycleState::Firing { .. } => "firing",
            LifecycleState::SnoozeCountdown { .. } => "snooze_countdown",
        }
    }
}
