use std::path::PathBuf;

use chrono::Local;
use clap::{Args, Subcommand};
use serde::Serialize;
use wakeup_core::{
    AlarmConfig, AlarmRegistry, Config, CoreError, Database, RecurrenceRule, SnoozeMode,
    TimeOfDay, TrackRef, ValidationError,
};

use crate::common::{print_json, CliResult};

#[derive(Subcommand)]
pub enum AlarmAction {
    /// List all alarms
    List {
        /// Only enabled alarms
        #[arg(long)]
        enabled: bool,
    },
    /// Show one alarm
    Show { id: i64 },
    /// Create an alarm from the configured defaults
    Add {
        /// Display title
        title: String,
        #[command(flatten)]
        fields: AlarmFields,
    },
    /// Change fields of an alarm
    Set {
        id: i64,
        /// New display title
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: AlarmFields,
    },
    /// Enable an alarm
    Enable { id: i64 },
    /// Disable an alarm
    Disable { id: i64 },
    /// Delete an alarm
    Remove { id: i64 },
    /// Show which alarm fires next
    Next,
}

#[derive(Args)]
pub struct AlarmFields {
    /// Time of day, HH:MM
    #[arg(long)]
    time: Option<TimeOfDay>,
    /// daily | days:mon,wed | weekdays[:mon,..] | rest-days | once:YYYY-MM-DD
    #[arg(long)]
    rule: Option<RecurrenceRule>,
    /// Base volume 0-100
    #[arg(long)]
    volume: Option<u8>,
    /// Seconds before ringing stops on its own
    #[arg(long)]
    duration: Option<u32>,
    /// off | on | volume-ramp-up
    #[arg(long)]
    snooze: Option<SnoozeMode>,
    #[arg(long)]
    snooze_length: Option<u32>,
    #[arg(long)]
    snooze_repeats: Option<u32>,
    /// Audio file to play instead of the built-in tone
    #[arg(long)]
    track: Option<PathBuf>,
    /// Use the built-in tone
    #[arg(long, conflicts_with = "track")]
    default_track: bool,
    #[arg(long)]
    vibrate: Option<bool>,
    #[arg(long)]
    speak: Option<bool>,
    /// Enable right away
    #[arg(long)]
    enable: bool,
}

impl AlarmFields {
    fn apply(self, alarm: &mut AlarmConfig) {
        if let Some(time) = self.time {
            alarm.time_of_day = time;
        }
        if let Some(rule) = self.rule {
            alarm.recurrence = rule;
        }
        if let Some(volume) = self.volume {
            alarm.music_volume = volume;
        }
        if let Some(duration) = self.duration {
            alarm.duration_seconds = duration;
        }
        if let Some(mode) = self.snooze {
            alarm.snooze.mode = mode;
        }
        if let Some(length) = self.snooze_length {
            alarm.snooze.length_minutes = length;
        }
        if let Some(repeats) = self.snooze_repeats {
            alarm.snooze.max_repeats = repeats;
        }
        if let Some(path) = self.track {
            alarm.track = TrackRef::File { path };
        } else if self.default_track {
            alarm.track = TrackRef::Default;
        }
        if let Some(vibrate) = self.vibrate {
            alarm.vibrate = vibrate;
        }
        if let Some(speak) = self.speak {
            alarm.speak = speak;
        }
        if self.enable {
            alarm.enabled = true;
        }
    }
}

#[derive(Serialize)]
struct NextAlarm<'a> {
    alarm_id: i64,
    title: &'a str,
    fire_at: chrono::NaiveDateTime,
}

fn load(db: &Database, id: i64) -> Result<AlarmConfig, CoreError> {
    db.get(id)?
        .ok_or(CoreError::Validation(ValidationError::AlarmNotFound(id)))
}

fn set_enabled(db: &Database, id: i64, enabled: bool) -> CliResult {
    let mut alarm = load(db, id)?;
    alarm.enabled = enabled;
    db.put(&alarm)?;
    print_json(&alarm)
}

pub fn run(action: AlarmAction, config: &Config) -> CliResult {
    let db = Database::open()?;
    match action {
        AlarmAction::List { enabled } => {
            let alarms = if enabled {
                db.list_enabled()?
            } else {
                db.list_all()?
            };
            print_json(&alarms)
        }
        AlarmAction::Show { id } => print_json(&load(&db, id)?),
        AlarmAction::Add { title, fields } => {
            let mut alarm = config.alarm_template(0, title);
            fields.apply(&mut alarm);
            alarm.recurrence.check()?;
            alarm.id = db.insert_alarm(&alarm)?;
            print_json(&alarm)
        }
        AlarmAction::Set { id, title, fields } => {
            let mut alarm = load(&db, id)?;
            if let Some(title) = title {
                alarm.title = title;
            }
            fields.apply(&mut alarm);
            alarm.recurrence.check()?;
            db.put(&alarm)?;
            print_json(&alarm)
        }
        AlarmAction::Enable { id } => set_enabled(&db, id, true),
        AlarmAction::Disable { id } => set_enabled(&db, id, false),
        AlarmAction::Remove { id } => {
            db.remove_alarm(id)?;
            println!("alarm {id} removed");
            Ok(())
        }
        AlarmAction::Next => {
            let alarms = db.list_enabled()?;
            let now = Local::now().naive_local();
            let next = config
                .resolver()
                .earliest(&alarms, now)
                .map(|(alarm, fire_at)| NextAlarm {
                    alarm_id: alarm.id,
                    title: &alarm.title,
                    fire_at,
                });
            print_json(&next)
        }
    }
}
