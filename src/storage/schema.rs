//! Database schema and migrations.

use rusqlite::Connection;

/// Current schema version recorded in `schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS trigger_history (
            id TEXT PRIMARY KEY,
            fire_instance_id TEXT NOT NULL UNIQUE,
            job_group TEXT NOT NULL,
            job_name TEXT NOT NULL,
            trigger_group TEXT NOT NULL,
            trigger_name TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            CHECK (end_time IS NULL OR end_time >= start_time)
        );

        CREATE INDEX IF NOT EXISTS idx_trigger_history_job ON trigger_history(job_group, job_name);
        CREATE INDEX IF NOT EXISTS idx_trigger_history_trigger ON trigger_history(trigger_group, trigger_name);
        CREATE INDEX IF NOT EXISTS idx_trigger_history_start ON trigger_history(start_time);
        CREATE INDEX IF NOT EXISTS idx_trigger_history_end ON trigger_history(end_time);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
