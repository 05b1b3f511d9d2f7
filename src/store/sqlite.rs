use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use uuid::Uuid;

use super::{PersistenceError, TriggerHistoryStore};
use crate::history::{JobKey, TriggerHistory, TriggerKey};
use crate::storage::{format_ts, parse_ts};

const COLUMNS: &str = "id, fire_instance_id, job_group, job_name, trigger_group, trigger_name, start_time, end_time";

/// [`TriggerHistoryStore`] over the `trigger_history` table.
///
/// Stateless: all state lives in the database, so one instance can be shared
/// by every worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTriggerHistoryStore;

impl SqliteTriggerHistoryStore {
    pub fn new() -> Self {
        Self
    }

    fn query_list<P: Params>(
        &self,
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawRow::read)?;

        let mut list = Vec::new();
        for r in rows {
            list.push(r?.decode()?);
        }
        Ok(list)
    }

    fn query_one<P: Params>(
        &self,
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Option<TriggerHistory>, PersistenceError> {
        conn.query_row(sql, params, RawRow::read)
            .optional()?
            .map(RawRow::decode)
            .transpose()
    }
}

/// Column values as stored, before parsing ids and timestamps.
struct RawRow {
    id: String,
    fire_instance_id: String,
    job_group: String,
    job_name: String,
    trigger_group: String,
    trigger_name: String,
    start_time: String,
    end_time: Option<String>,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fire_instance_id: row.get(1)?,
            job_group: row.get(2)?,
            job_name: row.get(3)?,
            trigger_group: row.get(4)?,
            trigger_name: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
        })
    }

    fn decode(self) -> Result<TriggerHistory, PersistenceError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| PersistenceError::Corrupt(format!("id '{}': {}", self.id, e)))?;
        let start_time = parse_ts(&self.start_time).map_err(|e| {
            PersistenceError::Corrupt(format!("start_time '{}': {}", self.start_time, e))
        })?;
        let end_time = match self.end_time {
            Some(s) => Some(
                parse_ts(&s)
                    .map_err(|e| PersistenceError::Corrupt(format!("end_time '{}': {}", s, e)))?,
            ),
            None => None,
        };

        Ok(TriggerHistory {
            id: Some(id),
            fire_instance_id: self.fire_instance_id,
            job_key: JobKey::new(self.job_group, self.job_name),
            trigger_key: TriggerKey::new(self.trigger_group, self.trigger_name),
            start_time,
            end_time,
        })
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl TriggerHistoryStore for SqliteTriggerHistoryStore {
    fn create(
        &self,
        conn: &Connection,
        record: &TriggerHistory,
    ) -> Result<TriggerHistory, PersistenceError> {
        let id = record.id.ok_or(PersistenceError::MissingId)?;
        let start_time = record.start_time.trunc_subsecs(6);

        // A new record is always in flight, whatever the caller passed.
        conn.execute(
            "INSERT INTO trigger_history
                (id, fire_instance_id, job_group, job_name, trigger_group, trigger_name, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
            params![
                id.to_string(),
                record.fire_instance_id,
                record.job_key.group,
                record.job_key.name,
                record.trigger_key.group,
                record.trigger_key.name,
                format_ts(&start_time),
            ],
        )?;

        Ok(TriggerHistory {
            start_time,
            end_time: None,
            ..record.clone()
        })
    }

    fn update_end_time(
        &self,
        conn: &Connection,
        fire_instance_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<usize, PersistenceError> {
        // MAX() clamps a skewed completion clock to start_time.
        let changed = conn.execute(
            "UPDATE trigger_history
             SET end_time = MAX(start_time, ?2)
             WHERE fire_instance_id = ?1 AND end_time IS NULL",
            params![fire_instance_id, format_ts(&end_time)],
        )?;
        Ok(changed)
    }

    fn find_by_id(
        &self,
        conn: &Connection,
        id: &Uuid,
    ) -> Result<Option<TriggerHistory>, PersistenceError> {
        self.query_one(
            conn,
            &format!("SELECT {COLUMNS} FROM trigger_history WHERE id = ?1"),
            params![id.to_string()],
        )
    }

    fn find_by_fire_instance_id(
        &self,
        conn: &Connection,
        fire_instance_id: &str,
    ) -> Result<Option<TriggerHistory>, PersistenceError> {
        self.query_one(
            conn,
            &format!("SELECT {COLUMNS} FROM trigger_history WHERE fire_instance_id = ?1"),
            params![fire_instance_id],
        )
    }

    fn find_by_job_key(
        &self,
        conn: &Connection,
        key: &JobKey,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.query_list(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM trigger_history
                 WHERE job_group = ?1 AND job_name = ?2
                 ORDER BY start_time, id LIMIT ?3"
            ),
            params![key.group, key.name, sql_limit(limit)],
        )
    }

    fn find_by_trigger_key(
        &self,
        conn: &Connection,
        key: &TriggerKey,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.query_list(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM trigger_history
                 WHERE trigger_group = ?1 AND trigger_name = ?2
                 ORDER BY start_time, id LIMIT ?3"
            ),
            params![key.group, key.name, sql_limit(limit)],
        )
    }

    fn find_by_start_time_range(
        &self,
        conn: &Connection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.query_list(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM trigger_history
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time, id LIMIT ?3"
            ),
            params![format_ts(&from), format_ts(&to), sql_limit(limit)],
        )
    }

    fn find_by_end_time_range(
        &self,
        conn: &Connection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.query_list(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM trigger_history
                 WHERE end_time IS NOT NULL AND end_time >= ?1 AND end_time < ?2
                 ORDER BY start_time, id LIMIT ?3"
            ),
            params![format_ts(&from), format_ts(&to), sql_limit(limit)],
        )
    }

    fn find_in_flight(
        &self,
        conn: &Connection,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.query_list(
            conn,
            &format!(
                "SELECT {COLUMNS} FROM trigger_history
                 WHERE end_time IS NULL
                 ORDER BY start_time, id LIMIT ?1"
            ),
            params![sql_limit(limit)],
        )
    }

    fn count(&self, conn: &Connection) -> Result<u64, PersistenceError> {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM trigger_history", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema;
    use chrono::TimeZone;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn record(fire_id: &str, job: &str, trigger: &str, start: DateTime<Utc>) -> TriggerHistory {
        let mut h = TriggerHistory::fired(
            fire_id,
            JobKey::new("G", job),
            TriggerKey::new("TG", trigger),
            start,
        );
        h.ensure_id();
        h
    }

    #[test]
    fn test_create_and_find() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        let rec = record("abc-1", "J", "T1", at(10, 0));

        let stored = store.create(&conn, &rec).unwrap();
        assert_eq!(stored, rec);
        assert!(stored.end_time.is_none());

        let by_id = store.find_by_id(&conn, &rec.id.unwrap()).unwrap().unwrap();
        assert_eq!(by_id.fire_instance_id, "abc-1");
        assert_eq!(by_id.job_key, JobKey::new("G", "J"));
        assert_eq!(by_id.trigger_key, TriggerKey::new("TG", "T1"));
        assert_eq!(by_id.start_time, at(10, 0));
        assert!(by_id.end_time.is_none());

        let by_fire = store.find_by_fire_instance_id(&conn, "abc-1").unwrap().unwrap();
        assert_eq!(by_fire, by_id);
    }

    #[test]
    fn test_create_requires_id() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        let rec = TriggerHistory::fired("x", JobKey::new("G", "J"), TriggerKey::new("TG", "T"), at(1, 0));
        assert!(matches!(store.create(&conn, &rec), Err(PersistenceError::MissingId)));
    }

    #[test]
    fn test_create_ignores_preset_end_time() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        let mut rec = record("abc-1", "J", "T1", at(10, 0));
        rec.end_time = Some(at(11, 0));

        let stored = store.create(&conn, &rec).unwrap();
        assert!(stored.end_time.is_none());
        let found = store.find_by_fire_instance_id(&conn, "abc-1").unwrap().unwrap();
        assert!(found.end_time.is_none());
    }

    #[test]
    fn test_create_returns_persisted_start_time() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        let mut rec = record("abc-1", "J", "T1", at(12, 0));
        rec.start_time = "2024-01-01T12:00:00.123456789Z".parse().unwrap();

        let stored = store.create(&conn, &rec).unwrap();
        let found = store.find_by_fire_instance_id(&conn, "abc-1").unwrap().unwrap();
        assert_eq!(stored.start_time, found.start_time);
        assert_eq!(
            found.start_time,
            "2024-01-01T12:00:00.123456Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_duplicate_fire_instance_is_constraint_violation() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        store.create(&conn, &record("dup", "J", "T", at(1, 0))).unwrap();

        let err = store.create(&conn, &record("dup", "J", "T", at(1, 5))).unwrap_err();
        assert!(matches!(err, PersistenceError::Constraint(_)), "got {err:?}");
        assert_eq!(store.count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_id_is_constraint_violation() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        let first = record("one", "J", "T", at(1, 0));
        store.create(&conn, &first).unwrap();

        let mut second = record("two", "J", "T", at(1, 0));
        second.id = first.id;
        let err = store.create(&conn, &second).unwrap_err();
        assert!(matches!(err, PersistenceError::Constraint(_)));
    }

    #[test]
    fn test_update_end_time_once() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        store.create(&conn, &record("abc-1", "J", "T1", at(10, 0))).unwrap();

        assert_eq!(store.update_end_time(&conn, "abc-1", at(10, 5)).unwrap(), 1);
        assert_eq!(store.update_end_time(&conn, "abc-1", at(10, 30)).unwrap(), 0);

        let found = store.find_by_fire_instance_id(&conn, "abc-1").unwrap().unwrap();
        assert_eq!(found.end_time, Some(at(10, 5)));
    }

    #[test]
    fn test_update_end_time_unknown_id_creates_nothing() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        assert_eq!(store.update_end_time(&conn, "xyz-9", at(10, 0)).unwrap(), 0);
        assert_eq!(store.count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_update_end_time_clamps_to_start() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        store.create(&conn, &record("skew", "J", "T", at(10, 0))).unwrap();

        assert_eq!(store.update_end_time(&conn, "skew", at(9, 59)).unwrap(), 1);
        let found = store.find_by_fire_instance_id(&conn, "skew").unwrap().unwrap();
        assert_eq!(found.end_time, Some(at(10, 0)));
    }

    #[test]
    fn test_queries_by_key_and_range() {
        let conn = conn();
        let store = SqliteTriggerHistoryStore::new();
        store.create(&conn, &record("a", "J1", "T1", at(9, 0))).unwrap();
        store.create(&conn, &record("b", "J1", "T2", at(10, 0))).unwrap();
        store.create(&conn, &record("c", "J2", "T1", at(11, 0))).unwrap();
        store.update_end_time(&conn, "a", at(9, 30)).unwrap();
        store.update_end_time(&conn, "c", at(11, 30)).unwrap();

        let ids = |v: Vec<TriggerHistory>| {
            v.into_iter().map(|h| h.fire_instance_id).collect::<Vec<_>>()
        };

        assert_eq!(ids(store.find_by_job_key(&conn, &JobKey::new("G", "J1"), 10).unwrap()), ["a", "b"]);
        assert_eq!(ids(store.find_by_trigger_key(&conn, &TriggerKey::new("TG", "T1"), 10).unwrap()), ["a", "c"]);
        assert_eq!(ids(store.find_by_job_key(&conn, &JobKey::new("G", "J1"), 1).unwrap()), ["a"]);

        assert_eq!(ids(store.find_by_start_time_range(&conn, at(9, 30), at(11, 0), 10).unwrap()), ["b"]);
        assert_eq!(ids(store.find_by_end_time_range(&conn, at(9, 0), at(12, 0), 10).unwrap()), ["a", "c"]);
        assert_eq!(ids(store.find_in_flight(&conn, 10).unwrap()), ["b"]);
        assert_eq!(store.count(&conn).unwrap(), 3);
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let conn = conn();
        conn.execute(
            "INSERT INTO trigger_history
                (id, fire_instance_id, job_group, job_name, trigger_group, trigger_name, start_time)
             VALUES ('not-a-uuid', 'bad', 'G', 'J', 'TG', 'T', '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        let store = SqliteTriggerHistoryStore::new();
        let err = store.find_by_fire_instance_id(&conn, "bad").unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
    }
}
