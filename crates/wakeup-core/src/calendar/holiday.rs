//! Rest-day classification.
//!
//! A rest day is a Sunday or, when the Japanese calendar is selected, one of
//! the national holidays computed by rule:
//!
//! - fixed-date holidays, each shifted to the next non-holiday day when it
//!   falls on a Sunday (substitute holiday)
//! - "Nth Monday of the month" holidays
//! - the spring and autumn equinox days, computed from the standard
//!   approximation valid for 1980..=2099
//! - a day sandwiched between two holidays (citizens' holiday)
//!
//! Classification is a pure function of the date; the resolver calls it
//! repeatedly while scanning forward.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// First and last year the equinox approximation is defined for.
pub const EQUINOX_YEARS: std::ops::RangeInclusive<i32> = 1980..=2099;

/// Which holiday rules apply on top of Sundays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HolidayCalendar {
    /// Only Sundays are rest days.
    #[default]
    SundaysOnly,
    /// Sundays plus Japanese national holidays.
    Japan,
}

/// A named holiday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holiday {
    NewYearsDay,
    ComingOfAgeDay,
    NationalFoundationDay,
    VernalEquinoxDay,
    ShowaDay,
    ConstitutionDay,
    GreeneryDay,
    ChildrensDay,
    MarineDay,
    RespectForTheAgedDay,
    AutumnalEquinoxDay,
    SportsDay,
    CultureDay,
    LaborThanksgivingDay,
    EmperorsBirthday,
    /// Day after a holiday that fell on a Sunday.
    Substitute,
    /// Day between two holidays.
    Citizens,
}

impl Holiday {
    /// Fixed-date and equinox holidays move to the next free day when they
    /// land on a Sunday. Monday holidays never need to.
    fn has_substitute(self) -> bool {
        !matches!(
            self,
            Holiday::ComingOfAgeDay
                | Holiday::MarineDay
                | Holiday::RespectForTheAgedDay
                | Holiday::SportsDay
                | Holiday::Substitute
                | Holiday::Citizens
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Holiday::NewYearsDay => "New Year's Day",
            Holiday::ComingOfAgeDay => "Coming of Age Day",
            Holiday::NationalFoundationDay => "National Foundation Day",
            Holiday::VernalEquinoxDay => "Vernal Equinox Day",
            Holiday::ShowaDay => "Showa Day",
            Holiday::ConstitutionDay => "Constitution Memorial Day",
            Holiday::GreeneryDay => "Greenery Day",
            Holiday::ChildrensDay => "Children's Day",
            Holiday::MarineDay => "Marine Day",
            Holiday::RespectForTheAgedDay => "Respect for the Aged Day",
            Holiday::AutumnalEquinoxDay => "Autumnal Equinox Day",
            Holiday::SportsDay => "Sports Day",
            Holiday::CultureDay => "Culture Day",
            Holiday::LaborThanksgivingDay => "Labor Thanksgiving Day",
            Holiday::EmperorsBirthday => "Emperor's Birthday",
            Holiday::Substitute => "Substitute Holiday",
            Holiday::Citizens => "Citizens' Holiday",
        }
    }
}

const FIXED_HOLIDAYS: [(u32, u32, Holiday); 9] = [
    (1, 1, Holiday::NewYearsDay),
    (2, 11, Holiday::NationalFoundationDay),
    (4, 29, Holiday::ShowaDay),
    (5, 3, Holiday::ConstitutionDay),
    (5, 4, Holiday::GreeneryDay),
    (5, 5, Holiday::ChildrensDay),
    (11, 3, Holiday::CultureDay),
    (11, 23, Holiday::LaborThanksgivingDay),
    (12, 23, Holiday::EmperorsBirthday),
];

/// (month, nth Monday, holiday)
const MONDAY_HOLIDAYS: [(u32, u32, Holiday); 4] = [
    (1, 2, Holiday::ComingOfAgeDay),
    (7, 3, Holiday::MarineDay),
    (9, 3, Holiday::RespectForTheAgedDay),
    (10, 2, Holiday::SportsDay),
];

impl HolidayCalendar {
    /// True if `year-month-day` is a rest day. Impossible dates are not.
    pub fn is_rest_day(self, year: i32, month: u32, day: u32) -> bool {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|date| self.is_rest_date(date))
            .unwrap_or(false)
    }

    pub fn is_rest_date(self, date: NaiveDate) -> bool {
        date.weekday() == Weekday::Sun || self.holiday(date).is_some()
    }

    /// The holiday observed on `date`, if any. Plain Sundays are not named.
    pub fn holiday(self, date: NaiveDate) -> Option<Holiday> {
        match self {
            HolidayCalendar::SundaysOnly => None,
            HolidayCalendar::Japan => japanese_holiday(date),
        }
    }

    /// Every named holiday of `year`, in date order.
    pub fn holidays_in_year(self, year: i32) -> Vec<(NaiveDate, Holiday)> {
        let Some(first) = NaiveDate::from_ymd_opt(year, 1, 1) else {
            return Vec::new();
        };
        first
            .iter_days()
            .take_while(|d| d.year() == year)
            .filter_map(|d| self.holiday(d).map(|h| (d, h)))
            .collect()
    }
}

fn japanese_holiday(date: NaiveDate) -> Option<Holiday> {
    if let Some(h) = primary_holiday(date) {
        return Some(h);
    }
    if is_substitute(date) {
        return Some(Holiday::Substitute);
    }
    let before = date.pred_opt().and_then(primary_holiday);
    let after = date.succ_opt().and_then(primary_holiday);
    if before.is_some() && after.is_some() && date.weekday() != Weekday::Sun {
        return Some(Holiday::Citizens);
    }
    None
}

/// Holidays defined directly by a rule, without substitutes or bridges.
fn primary_holiday(date: NaiveDate) -> Option<Holiday> {
    let (month, day) = (date.month(), date.day());

    if let Some(&(_, _, h)) = FIXED_HOLIDAYS
        .iter()
        .find(|(m, d, _)| *m == month && *d == day)
    {
        return Some(h);
    }

    if date.weekday() == Weekday::Mon {
        let nth = (day - 1) / 7 + 1;
        if let Some(&(_, _, h)) = MONDAY_HOLIDAYS
            .iter()
            .find(|(m, n, _)| *m == month && *n == nth)
        {
            return Some(h);
        }
    }

    match month {
        3 if spring_equinox_day(date.year()) == Some(day) => Some(Holiday::VernalEquinoxDay),
        9 if autumn_equinox_day(date.year()) == Some(day) => Some(Holiday::AutumnalEquinoxDay),
        _ => None,
    }
}

/// Walk back over the run of holidays directly preceding `date`; if one of
/// them is a Sunday carrying the substitute rule, `date` is its substitute.
fn is_substitute(date: NaiveDate) -> bool {
    let mut cursor = date.pred_opt();
    while let Some(day) = cursor {
        let Some(h) = primary_holiday(day) else {
            return false;
        };
        if day.weekday() == Weekday::Sun && h.has_substitute() {
            return true;
        }
        cursor = day.pred_opt();
    }
    false
}

/// Day of March on which the vernal equinox falls.
pub fn spring_equinox_day(year: i32) -> Option<u32> {
    equinox_day(20.8431, year)
}

/// Day of September on which the autumnal equinox falls.
pub fn autumn_equinox_day(year: i32) -> Option<u32> {
    equinox_day(23.2488, year)
}

fn equinox_day(base: f64, year: i32) -> Option<u32> {
    if !EQUINOX_YEARS.contains(&year) {
        return None;
    }
    let offset = year - 1980;
    let day = base + 0.242194 * f64::from(offset) - f64::from(offset / 4);
    Some(day.floor() as u32)
}
