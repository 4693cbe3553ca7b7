use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::lifecycle::EpochKey;

/// Every lifecycle transition produces an Event.
/// The CLI prints them; stale dispatches produce none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    AlarmArmed {
        alarm_id: i64,
        fire_at: NaiveDateTime,
        epoch_key: EpochKey,
    },
    /// No enabled alarm will fire.
    AlarmsIdle { at: NaiveDateTime },
    AlarmFired {
        alarm_id: i64,
        volume: u8,
        at: NaiveDateTime,
    },
    AlarmSnoozed {
        alarm_id: i64,
        fire_at: NaiveDateTime,
        remaining_repeats: u32,
    },
    AlarmStopped { alarm_id: i64, at: NaiveDateTime },
}
