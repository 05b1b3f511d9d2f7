//! SQLite storage layer -- connection pool, schema, transaction scopes.

pub mod schema;
pub mod tx;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::StorageConfig;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database described by `config` and return a
/// connection pool with the schema migrated.
pub fn open_pool(config: &StorageConfig) -> Result<Pool> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let manager = SqliteConnectionManager::file(&config.path).with_init(move |c| {
        c.busy_timeout(busy_timeout)?;
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;",
        )
    });

    let pool = R2D2Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
        .with_context(|| format!("failed to open database: {}", config.path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn).context("failed to migrate database schema")?;

    tracing::debug!(path = %config.path.display(), pool_size = config.pool_size, "storage ready");
    Ok(pool)
}

/// Fixed-width RFC 3339 so that string order matches time order.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Fill open ends of a time range with bounds that stay inside the
/// four-digit-year window the stored format sorts correctly in.
pub fn range_or_all(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let lower = DateTime::<Utc>::UNIX_EPOCH;
    let upper = Utc
        .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(lower);
    (from.unwrap_or(lower), to.unwrap_or(upper))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1500);
        assert_eq!(format_ts(&a), "2024-01-01T00:00:00.000000Z");
        assert_eq!(format_ts(&a).len(), format_ts(&b).len());
        assert!(format_ts(&a) < format_ts(&b));
        assert_eq!(parse_ts(&format_ts(&b)).unwrap(), b);
    }

    #[test]
    fn test_range_or_all_covers_stored_timestamps() {
        let (lower, upper) = range_or_all(None, None);
        let now = Utc::now();
        assert!(format_ts(&lower) < format_ts(&now));
        assert!(format_ts(&now) < format_ts(&upper));

        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(range_or_all(Some(t), None).0, t);
        assert_eq!(range_or_all(None, Some(t)).1, t);
    }

    #[test]
    fn test_open_pool_creates_parent_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = StorageConfig {
            path: dir.path().join("nested/history.db"),
            ..StorageConfig::default()
        };
        let pool = open_pool(&cfg).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM trigger_history", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert!(cfg.path.exists());
    }
}
