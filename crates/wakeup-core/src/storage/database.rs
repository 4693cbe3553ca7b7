//! SQLite-based alarm storage.
//!
//! Provides persistent storage for:
//! - Alarm definitions
//! - Lifecycle state that must survive a restart (epoch key, snooze count)
//! - Errors the lifecycle controller recovered from

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::data_dir;
use super::migrations;
use crate::alarm::{AlarmConfig, RecurrenceRule, SnoozeSettings, TimeOfDay, TrackRef};
use crate::error::{CoreError, DatabaseError, Result, ValidationError};
use crate::integrations::{AlarmRegistry, ErrorSink};
use crate::lifecycle::EpochKey;

const KEY_EPOCH: &str = "lifecycle.epoch_key";
const KEY_SNOOZE_REMAINING: &str = "lifecycle.snooze_remaining";
const KEY_SNOOZED_ALARM: &str = "lifecycle.snoozed_alarm";
const KEY_ALARMS_REVISION: &str = "alarms.revision";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ALARM_COLUMNS: &str = "id, enabled, title, recurrence, hour, minute, music_volume, \
     duration_seconds, snooze_mode, snooze_length, snooze_max_repeats, track, vibrate, speak";

/// One entry of the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: i64,
    pub recorded_at: NaiveDateTime,
    pub message: String,
    pub cause: Option<String>,
}

/// SQLite database for alarms and lifecycle state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/wakeup/wakeup.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("wakeup.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Database(DatabaseError::Poisoned))
    }

    // ── Alarms ───────────────────────────────────────────────────────

    pub fn list_all(&self) -> Result<Vec<AlarmConfig>> {
        self.query_alarms(&format!("SELECT {ALARM_COLUMNS} FROM alarms ORDER BY id"))
    }

    fn query_alarms(&self, sql: &str) -> Result<Vec<AlarmConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], read_alarm_row)?;
        let mut alarms = Vec::new();
        for row in rows {
            alarms.push(decode_alarm(row?)?);
        }
        Ok(alarms)
    }

    /// Insert a new alarm, assigning the next free id. Returns the id.
    pub fn insert_alarm(&self, alarm: &AlarmConfig) -> Result<i64> {
        alarm.validate()?;
        let conn = self.conn()?;
        let id: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM alarms", [], |row| {
            row.get(0)
        })?;
        let mut alarm = alarm.clone();
        alarm.id = id;
        write_alarm(&conn, &alarm)?;
        Ok(id)
    }

    pub fn remove_alarm(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM alarms WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(ValidationError::AlarmNotFound(id).into());
        }
        bump_revision(&conn)
    }

    /// Counter bumped by every alarm write or removal; 0 before the first.
    ///
    /// A running daemon polls it to notice edits made by other processes.
    pub fn alarms_revision(&self) -> Result<u64> {
        match self.kv_get(KEY_ALARMS_REVISION)? {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| {
                DatabaseError::CorruptRow {
                    table: "kv",
                    message: format!("alarms revision '{raw}': {e}"),
                }
                .into()
            }),
            None => Ok(0),
        }
    }

    /// Create `count` disabled alarm slots titled "Alarm N" when the table
    /// is empty. Returns how many were created.
    pub fn seed_default_alarms(&self, count: u32, template: &AlarmConfig) -> Result<u32> {
        let conn = self.conn()?;
        let existing: i64 = conn.query_row("SELECT COUNT(*) FROM alarms", [], |row| row.get(0))?;
        if existing > 0 {
            return Ok(0);
        }

        let tx = conn.unchecked_transaction()?;
        for n in 1..=count {
            let mut alarm = template.clone();
            alarm.id = i64::from(n);
            alarm.title = format!("Alarm {n}");
            alarm.enabled = false;
            write_alarm(&tx, &alarm)?;
        }
        tx.commit()?;
        tracing::info!(count, "seeded default alarms");
        Ok(count)
    }

    // ── Key-value store ──────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store. `None` deletes the key.
    pub fn kv_set(&self, key: &str, value: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        match value {
            Some(value) => conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?,
            None => conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?,
        };
        Ok(())
    }

    /// Forget the persisted epoch key, snooze count and pending snooze.
    pub fn clear_lifecycle_state(&self) -> Result<()> {
        self.kv_set(KEY_EPOCH, None)?;
        self.kv_set(KEY_SNOOZE_REMAINING, None)?;
        self.kv_set(KEY_SNOOZED_ALARM, None)
    }

    // ── Error log ────────────────────────────────────────────────────

    pub fn record_error(&self, message: &str, cause: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO errors (recorded_at, message, cause) VALUES (?1, ?2, ?3)",
            params![
                Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string(),
                message,
                cause
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent first.
    pub fn list_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, recorded_at, message, cause FROM errors ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, recorded_at, message, cause) = row?;
            let recorded_at = NaiveDateTime::parse_from_str(&recorded_at, TIMESTAMP_FORMAT)
                .map_err(|e| DatabaseError::CorruptRow {
                    table: "errors",
                    message: format!("error {id}: {e}"),
                })?;
            records.push(ErrorRecord {
                id,
                recorded_at,
                message,
                cause,
            });
        }
        Ok(records)
    }

    pub fn clear_errors(&self) -> Result<usize> {
        Ok(self.conn()?.execute("DELETE FROM errors", [])?)
    }
}

impl AlarmRegistry for Database {
    fn list_enabled(&self) -> Result<Vec<AlarmConfig>> {
        self.query_alarms(&format!(
            "SELECT {ALARM_COLUMNS} FROM alarms WHERE enabled = 1 ORDER BY id"
        ))
    }

    fn get(&self, id: i64) -> Result<Option<AlarmConfig>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = ?1"),
                params![id],
                read_alarm_row,
            )
            .optional()?;
        row.map(decode_alarm).transpose()
    }

    fn put(&self, alarm: &AlarmConfig) -> Result<()> {
        alarm.validate()?;
        write_alarm(&*self.conn()?, alarm)
    }

    fn load_epoch_key(&self) -> Result<Option<EpochKey>> {
        match self.kv_get(KEY_EPOCH)? {
            Some(raw) => raw.parse().map(Some).map_err(|e: ValidationError| {
                DatabaseError::CorruptRow {
                    table: "kv",
                    message: e.to_string(),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    fn store_epoch_key(&self, key: Option<&EpochKey>) -> Result<()> {
        self.kv_set(KEY_EPOCH, key.map(|k| k.to_string()).as_deref())
    }

    fn load_snooze_remaining(&self) -> Result<Option<u32>> {
        match self.kv_get(KEY_SNOOZE_REMAINING)? {
            Some(raw) => raw.parse().map(Some).map_err(|e: std::num::ParseIntError| {
                DatabaseError::CorruptRow {
                    table: "kv",
                    message: format!("snooze remaining '{raw}': {e}"),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    fn store_snooze_remaining(&self, remaining: Option<u32>) -> Result<()> {
        self.kv_set(
            KEY_SNOOZE_REMAINING,
            remaining.map(|n| n.to_string()).as_deref(),
        )
    }

    fn load_snoozed_alarm(&self) -> Result<Option<i64>> {
        match self.kv_get(KEY_SNOOZED_ALARM)? {
            Some(raw) => raw.parse().map(Some).map_err(|e: std::num::ParseIntError| {
                DatabaseError::CorruptRow {
                    table: "kv",
                    message: format!("snoozed alarm '{raw}': {e}"),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    fn store_snoozed_alarm(&self, alarm_id: Option<i64>) -> Result<()> {
        self.kv_set(KEY_SNOOZED_ALARM, alarm_id.map(|id| id.to_string()).as_deref())
    }
}

impl ErrorSink for Database {
    fn report(&self, message: &str, cause: Option<&CoreError>) {
        let cause = cause.map(|e| e.to_string());
        if let Err(e) = self.record_error(message, cause.as_deref()) {
            tracing::error!(error = %e, report = message, "failed to record error");
        }
    }
}

/// Raw column values of one `alarms` row.
struct AlarmRow {
    id: i64,
    enabled: bool,
    title: String,
    recurrence: String,
    hour: u8,
    minute: u8,
    music_volume: u8,
    duration_seconds: u32,
    snooze_mode: String,
    snooze_length: u32,
    snooze_max_repeats: u32,
    track: String,
    vibrate: bool,
    speak: bool,
}

fn read_alarm_row(row: &Row<'_>) -> rusqlite::Result<AlarmRow> {
    Ok(AlarmRow {
        id: row.get(0)?,
        enabled: row.get(1)?,
        title: row.get(2)?,
        recurrence: row.get(3)?,
        hour: row.get(4)?,
        minute: row.get(5)?,
        music_volume: row.get(6)?,
        duration_seconds: row.get(7)?,
        snooze_mode: row.get(8)?,
        snooze_length: row.get(9)?,
        snooze_max_repeats: row.get(10)?,
        track: row.get(11)?,
        vibrate: row.get(12)?,
        speak: row.get(13)?,
    })
}

fn decode_alarm(row: AlarmRow) -> Result<AlarmConfig> {
    let corrupt = |message: String| DatabaseError::CorruptRow {
        table: "alarms",
        message: format!("alarm {}: {message}", row.id),
    };
    let recurrence: RecurrenceRule =
        serde_json::from_str(&row.recurrence).map_err(|e| corrupt(e.to_string()))?;
    let track: TrackRef = serde_json::from_str(&row.track).map_err(|e| corrupt(e.to_string()))?;
    let mode = row
        .snooze_mode
        .parse()
        .map_err(|e: ValidationError| corrupt(e.to_string()))?;

    Ok(AlarmConfig {
        id: row.id,
        enabled: row.enabled,
        title: row.title,
        recurrence,
        time_of_day: TimeOfDay::new(row.hour, row.minute),
        music_volume: row.music_volume,
        duration_seconds: row.duration_seconds,
        snooze: SnoozeSettings {
            mode,
            length_minutes: row.snooze_length,
            max_repeats: row.snooze_max_repeats,
        },
        track,
        vibrate: row.vibrate,
        speak: row.speak,
    })
}

fn write_alarm(conn: &Connection, alarm: &AlarmConfig) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO alarms ({ALARM_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            alarm.id,
            alarm.enabled,
            alarm.title,
            serde_json::to_string(&alarm.recurrence)?,
            alarm.time_of_day.hour,
            alarm.time_of_day.minute,
            alarm.music_volume,
            alarm.duration_seconds,
            alarm.snooze.mode.as_str(),
            alarm.snooze.length_minutes,
            alarm.snooze.max_repeats,
            serde_json::to_string(&alarm.track)?,
            alarm.vibrate,
            alarm.speak,
        ],
    )?;
    bump_revision(conn)
}

fn bump_revision(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, '1')
         ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)",
        params![KEY_ALARMS_REVISION],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{DaySet, SnoozeMode};

    fn alarm(id: i64, enabled: bool) -> AlarmConfig {
        let mut alarm = AlarmConfig::new(id, format!("Alarm {id}"));
        alarm.enabled = enabled;
        alarm.time_of_day = TimeOfDay::new(6, 30);
        alarm
    }

    #[test]
    fn put_get_roundtrip_keeps_every_field() {
        let db = Database::open_in_memory().unwrap();
        let mut a = alarm(2, true);
        a.recurrence = RecurrenceRule::Weekdays {
            days: DaySet::WORKWEEK,
        };
        a.snooze = SnoozeSettings {
            mode: SnoozeMode::VolumeRampUp,
            length_minutes: 7,
            max_repeats: 3,
        };
        a.track = TrackRef::File {
            path: "/music/wake.ogg".into(),
        };
        a.vibrate = true;
        a.speak = true;
        db.put(&a).unwrap();
        assert_eq!(db.get(2).unwrap(), Some(a));
        assert_eq!(db.get(99).unwrap(), None);
    }

    #[test]
    fn list_enabled_is_sorted_and_filtered() {
        let db = Database::open_in_memory().unwrap();
        db.put(&alarm(5, true)).unwrap();
        db.put(&alarm(1, false)).unwrap();
        db.put(&alarm(3, true)).unwrap();
        let ids: Vec<i64> = db.list_enabled().unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(db.list_all().unwrap().len(), 3);
    }

    #[test]
    fn put_rejects_invalid_alarm() {
        let db = Database::open_in_memory().unwrap();
        let mut a = alarm(1, true);
        a.music_volume = 150;
        assert!(matches!(db.put(&a), Err(CoreError::Validation(_))));
    }

    #[test]
    fn insert_assigns_next_id_and_remove_deletes() {
        let db = Database::open_in_memory().unwrap();
        db.put(&alarm(4, false)).unwrap();
        let id = db.insert_alarm(&alarm(0, true)).unwrap();
        assert_eq!(id, 5);
        db.remove_alarm(4).unwrap();
        assert!(matches!(
            db.remove_alarm(4),
            Err(CoreError::Validation(ValidationError::AlarmNotFound(4)))
        ));
    }

    #[test]
    fn seeding_only_happens_once() {
        let db = Database::open_in_memory().unwrap();
        let template = AlarmConfig::new(0, "");
        assert_eq!(db.seed_default_alarms(12, &template).unwrap(), 12);
        assert_eq!(db.seed_default_alarms(12, &template).unwrap(), 0);
        let all = db.list_all().unwrap();
        assert_eq!(all.len(), 12);
        assert_eq!(all[11].title, "Alarm 12");
        assert!(db.list_enabled().unwrap().is_empty());
    }

    #[test]
    fn lifecycle_state_persists_and_clears() {
        let db = Database::open_in_memory().unwrap();
        let key: EpochKey = "20250101070000#3".parse().unwrap();
        db.store_epoch_key(Some(&key)).unwrap();
        db.store_snooze_remaining(Some(2)).unwrap();
        db.store_snoozed_alarm(Some(7)).unwrap();
        assert_eq!(db.load_epoch_key().unwrap(), Some(key));
        assert_eq!(db.load_snooze_remaining().unwrap(), Some(2));
        assert_eq!(db.load_snoozed_alarm().unwrap(), Some(7));

        db.clear_lifecycle_state().unwrap();
        assert_eq!(db.load_epoch_key().unwrap(), None);
        assert_eq!(db.load_snooze_remaining().unwrap(), None);
        assert_eq!(db.load_snoozed_alarm().unwrap(), None);
    }

    #[test]
    fn alarm_edits_bump_revision() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.alarms_revision().unwrap(), 0);

        db.put(&alarm(1, true)).unwrap();
        let after_put = db.alarms_revision().unwrap();
        assert!(after_put > 0);

        let id = db.insert_alarm(&alarm(0, false)).unwrap();
        let after_insert = db.alarms_revision().unwrap();
        assert!(after_insert > after_put);

        db.remove_alarm(id).unwrap();
        assert!(db.alarms_revision().unwrap() > after_insert);

        // lifecycle bookkeeping is not an edit
        let before = db.alarms_revision().unwrap();
        db.store_snooze_remaining(Some(3)).unwrap();
        assert_eq!(db.alarms_revision().unwrap(), before);
    }

    #[test]
    fn corrupt_epoch_key_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.kv_set(KEY_EPOCH, Some("garbage")).unwrap();
        assert!(matches!(
            db.load_epoch_key(),
            Err(CoreError::Database(DatabaseError::CorruptRow { .. }))
        ));
    }

    #[test]
    fn error_sink_writes_log() {
        let db = Database::open_in_memory().unwrap();
        db.report("alarm is turned off", None);
        db.report(
            "could not start audio",
            Some(&CoreError::unavailable("audio", "no device")),
        );
        let errors = db.list_errors(10).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "could not start audio");
        assert_eq!(errors[0].cause.as_deref(), Some("audio unavailable: no device"));
        assert_eq!(errors[1].cause, None);
        assert_eq!(db.clear_errors().unwrap(), 2);
        assert!(db.list_errors(10).unwrap().is_empty());
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wakeup.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.put(&alarm(1, true)).unwrap();
            db.store_snooze_remaining(Some(4)).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.list_enabled().unwrap().len(), 1);
        assert_eq!(db.load_snooze_remaining().unwrap(), Some(4));
    }
}
