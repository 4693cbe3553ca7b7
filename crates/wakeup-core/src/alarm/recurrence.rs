//! Recurrence rules and the resolver that turns them into fire instants.
//!
//! Every rule resolves against a wall-clock `now` to the earliest instant
//! strictly after `now`, or to `None` when nothing qualifies inside the
//! rule's search horizon. Instants are local wall-clock times.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::config::{AlarmConfig, TimeOfDay};
use crate::calendar::HolidayCalendar;
use crate::error::{CoreError, ValidationError};

/// Candidates checked for `SpecifyDays` (today plus one full week).
pub const SPECIFY_DAYS_HORIZON_DAYS: usize = 8;
/// Candidates checked for `Weekdays`, enough to clear long holiday runs.
pub const WEEKDAYS_HORIZON_DAYS: usize = 36;
/// Candidates checked for `RestDayOnly`. Every week has a Sunday, so this is
/// never reached in practice.
pub const REST_DAY_HORIZON_DAYS: usize = 366;

const WEEK: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Set of weekdays, bit 0 = Sunday through bit 6 = Saturday.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);
    pub const ALL: DaySet = DaySet(0b111_1111);
    /// Monday through Friday.
    pub const WORKWEEK: DaySet = DaySet(0b011_1110);

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_sunday()
    }

    pub fn from_bits(bits: u8) -> Self {
        DaySet(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = DaySet::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl fmt::Debug for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<String> = self.iter().map(|d| d.to_string()).collect();
        f.write_str(&names.join(","))
    }
}

impl FromStr for DaySet {
    type Err = ValidationError;

    /// Accepts `all`, `none`, `workweek` or a comma-separated list such as
    /// `mon,wed,fri`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => return Ok(DaySet::ALL),
            "none" | "" => return Ok(DaySet::EMPTY),
            "workweek" => return Ok(DaySet::WORKWEEK),
            _ => {}
        }
        s.split(',')
            .map(|part| {
                part.trim().parse::<Weekday>().map_err(|_| {
                    ValidationError::invalid("days", format!("unknown weekday '{}'", part.trim()))
                })
            })
            .collect()
    }
}

/// How an alarm repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceRule {
    Daily,
    /// Only on the listed weekdays. An empty set never fires.
    SpecifyDays { days: DaySet },
    /// On the listed working weekdays, skipping rest days.
    Weekdays { days: DaySet },
    /// Only on rest days (Sundays and holidays).
    RestDayOnly,
    /// A single calendar date, month 1-based.
    Once { year: i32, month: u32, day: u32 },
}

impl RecurrenceRule {
    /// Report rules that can never fire.
    pub fn check(&self) -> Result<(), CoreError> {
        match *self {
            RecurrenceRule::SpecifyDays { days } | RecurrenceRule::Weekdays { days }
                if days.is_empty() =>
            {
                Err(CoreError::Configuration("day set is empty".into()))
            }
            RecurrenceRule::Once { year, month, day }
                if NaiveDate::from_ymd_opt(year, month, day).is_none() =>
            {
                Err(CoreError::Configuration(format!(
                    "{year:04}-{month:02}-{day:02} is not a calendar date"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrenceRule::Daily => f.write_str("daily"),
            RecurrenceRule::SpecifyDays { days } => write!(f, "days:{days}"),
            RecurrenceRule::Weekdays { days } => write!(f, "weekdays:{days}"),
            RecurrenceRule::RestDayOnly => f.write_str("rest-days"),
            RecurrenceRule::Once { year, month, day } => {
                write!(f, "once:{year:04}-{month:02}-{day:02}")
            }
        }
    }
}

impl FromStr for RecurrenceRule {
    type Err = ValidationError;

    /// Parses the `Display` form: `daily`, `days:mon,tue`, `weekdays`,
    /// `weekdays:mon,tue`, `rest-days`, `once:2025-01-01`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };
        match (kind.to_ascii_lowercase().as_str(), arg) {
            ("daily", None) => Ok(RecurrenceRule::Daily),
            ("days", Some(days)) => Ok(RecurrenceRule::SpecifyDays { days: days.parse()? }),
            ("weekdays", None) => Ok(RecurrenceRule::Weekdays {
                days: DaySet::WORKWEEK,
            }),
            ("weekdays", Some(days)) => Ok(RecurrenceRule::Weekdays { days: days.parse()? }),
            ("rest-days", None) => Ok(RecurrenceRule::RestDayOnly),
            ("once", Some(date)) => {
                let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
                    ValidationError::invalid("recurrence", format!("'{date}': {e}"))
                })?;
                Ok(RecurrenceRule::Once {
                    year: date.year(),
                    month: date.month(),
                    day: date.day(),
                })
            }
            _ => Err(ValidationError::invalid(
                "recurrence",
                format!("unrecognised rule '{s}'"),
            )),
        }
    }
}

/// Resolves rules to next fire instants using one holiday calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecurrenceResolver {
    calendar: HolidayCalendar,
}

impl RecurrenceResolver {
    pub fn new(calendar: HolidayCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> HolidayCalendar {
        self.calendar
    }

    /// Earliest instant strictly after `now` that satisfies `rule`.
    pub fn next_fire(
        &self,
        rule: &RecurrenceRule,
        time_of_day: TimeOfDay,
        now: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let time = time_of_day.to_naive_time()?;
        let today = now.date();

        match *rule {
            RecurrenceRule::Daily => {
                let candidate = today.and_time(time);
                if candidate > now {
                    Some(candidate)
                } else {
                    today.succ_opt().map(|d| d.and_time(time))
                }
            }
            RecurrenceRule::SpecifyDays { days } => {
                scan(today, time, now, SPECIFY_DAYS_HORIZON_DAYS, |d| {
                    days.contains(d.weekday())
                })
            }
            RecurrenceRule::Weekdays { days } => {
                scan(today, time, now, WEEKDAYS_HORIZON_DAYS, |d| {
                    days.contains(d.weekday()) && !self.calendar.is_rest_date(d)
                })
            }
            RecurrenceRule::RestDayOnly => scan(today, time, now, REST_DAY_HORIZON_DAYS, |d| {
                self.calendar.is_rest_date(d)
            }),
            RecurrenceRule::Once { year, month, day } => NaiveDate::from_ymd_opt(year, month, day)
                .map(|d| d.and_time(time))
                .filter(|candidate| *candidate > now),
        }
    }

    pub fn next_fire_for(&self, alarm: &AlarmConfig, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.next_fire(&alarm.recurrence, alarm.time_of_day, now)
    }

    /// The enabled alarm that fires first. Equal instants go to the lowest
    /// id so the choice never depends on iteration order.
    pub fn earliest<'a, I>(&self, alarms: I, now: NaiveDateTime) -> Option<(&'a AlarmConfig, NaiveDateTime)>
    where
        I: IntoIterator<Item = &'a AlarmConfig>,
    {
        alarms
            .into_iter()
            .filter(|a| a.enabled)
            .filter_map(|a| self.next_fire_for(a, now).map(|at| (a, at)))
            .min_by_key(|(a, at)| (*at, a.id))
    }
}

fn scan(
    start: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
    horizon: usize,
    accept: impl Fn(NaiveDate) -> bool,
) -> Option<NaiveDateTime> {
    start
        .iter_days()
        .take(horizon)
        .filter(|d| accept(*d))
        .map(|d| d.and_time(time))
        .find(|candidate| *candidate > now)
}
