use chrono::{Datelike, NaiveDate};
use clap::Subcommand;
use serde::Serialize;
use wakeup_core::{Config, HolidayCalendar};

use crate::common::{print_json, CliResult};

#[derive(Subcommand)]
pub enum HolidayAction {
    /// Classify one date
    Check {
        /// YYYY-MM-DD
        date: NaiveDate,
        /// sundays-only | japan (defaults to the configured calendar)
        #[arg(long, value_parser = parse_calendar)]
        calendar: Option<HolidayCalendar>,
    },
    /// List the holidays of a year
    List {
        year: i32,
        #[arg(long, value_parser = parse_calendar)]
        calendar: Option<HolidayCalendar>,
    },
}

#[derive(Serialize)]
struct DayReport {
    date: NaiveDate,
    weekday: String,
    rest_day: bool,
    holiday: Option<&'static str>,
}

fn parse_calendar(s: &str) -> Result<HolidayCalendar, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown calendar '{s}' (expected sundays-only or japan)"))
}

fn report(calendar: HolidayCalendar, date: NaiveDate) -> DayReport {
    DayReport {
        date,
        weekday: date.weekday().to_string(),
        rest_day: calendar.is_rest_date(date),
        holiday: calendar.holiday(date).map(|h| h.label()),
    }
}

pub fn run(action: HolidayAction, config: &Config) -> CliResult {
    match action {
        HolidayAction::Check { date, calendar } => {
            let calendar = calendar.unwrap_or(config.calendar.holidays);
            print_json(&report(calendar, date))
        }
        HolidayAction::List { year, calendar } => {
            let calendar = calendar.unwrap_or(config.calendar.holidays);
            let days: Vec<DayReport> = calendar
                .holidays_in_year(year)
                .into_iter()
                .map(|(date, _)| report(calendar, date))
                .collect();
            print_json(&days)
        }
    }
}
