//! Database schema migrations for wakeup.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: alarms and the key-value store for lifecycle state.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS alarms (
            id                  INTEGER PRIMARY KEY,
            enabled             INTEGER NOT NULL DEFAULT 0,
            title               TEXT NOT NULL DEFAULT '',
            recurrence          TEXT NOT NULL,
            hour                INTEGER NOT NULL,
            minute              INTEGER NOT NULL,
            music_volume        INTEGER NOT NULL DEFAULT 100,
            duration_seconds    INTEGER NOT NULL DEFAULT 300,
            snooze_mode         TEXT NOT NULL DEFAULT 'off',
            snooze_length       INTEGER NOT NULL DEFAULT 10,
            snooze_max_repeats  INTEGER NOT NULL DEFAULT 5
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alarms_enabled ON alarms(enabled);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: error log.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS errors (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            message     TEXT NOT NULL,
            cause       TEXT
        );",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: track selection, vibration and speech flags on alarms.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE alarms ADD COLUMN track TEXT NOT NULL DEFAULT '{\"kind\":\"default\"}';
         ALTER TABLE alarms ADD COLUMN vibrate INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE alarms ADD COLUMN speak INTEGER NOT NULL DEFAULT 0;",
    )?;
    set_schema_version(&tx, 3)?;
    tx.commit()
}
