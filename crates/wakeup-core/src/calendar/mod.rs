//! Calendar rules: rest-day classification.

pub mod holiday;

pub use holiday::{autumn_equinox_day, spring_equinox_day, Holiday, HolidayCalendar};
