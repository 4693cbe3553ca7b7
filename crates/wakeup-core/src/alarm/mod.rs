//! Alarm definitions and recurrence resolution.

mod config;
mod recurrence;

pub use config::{AlarmConfig, SnoozeMode, SnoozeSettings, TimeOfDay, TrackRef};
pub use recurrence::{
    DaySet, RecurrenceResolver, RecurrenceRule, REST_DAY_HORIZON_DAYS,
    SPECIFY_DAYS_HORIZON_DAYS, WEEKDAYS_HORIZON_DAYS,
};
