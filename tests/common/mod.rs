//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use trigger_history::config::StorageConfig;
use trigger_history::history::{JobKey, TriggerHistory, TriggerKey};
use trigger_history::scheduler::{FireContext, Trigger};
use trigger_history::storage::{open_pool, Pool};
use trigger_history::store::{PersistenceError, SqliteTriggerHistoryStore, TriggerHistoryStore};

pub fn temp_pool(pool_size: u32) -> (tempfile::TempDir, Pool) {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = open_pool(&StorageConfig {
        path: dir.path().join("history.db"),
        pool_size,
        busy_timeout_ms: 10_000,
    })
    .unwrap();
    (dir, pool)
}

pub fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
}

/// Job (G, J) fired by trigger (TG, T1).
pub fn trigger() -> Trigger {
    Trigger::new(TriggerKey::new("TG", "T1"), JobKey::new("G", "J"))
}

pub fn fired(fire_instance_id: &str, at: DateTime<Utc>) -> FireContext {
    FireContext::new(fire_instance_id, at)
}

/// Delegates to the SQLite store and counts every call.
#[derive(Default)]
pub struct CountingStore {
    inner: SqliteTriggerHistoryStore,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub reads: AtomicUsize,
}

impl CountingStore {
    pub fn total(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.reads.load(Ordering::SeqCst)
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl TriggerHistoryStore for CountingStore {
    fn create(
        &self,
        conn: &Connection,
        record: &TriggerHistory,
    ) -> Result<TriggerHistory, PersistenceError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(conn, record)
    }

    fn update_end_time(
        &self,
        conn: &Connection,
        fire_instance_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<usize, PersistenceError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_end_time(conn, fire_instance_id, end_time)
    }

    fn find_by_id(
        &self,
        conn: &Connection,
        id: &Uuid,
    ) -> Result<Option<TriggerHistory>, PersistenceError> {
        self.read();
        self.inner.find_by_id(conn, id)
    }

    fn find_by_fire_instance_id(
        &self,
        conn: &Connection,
        fire_instance_id: &str,
    ) -> Result<Option<TriggerHistory>, PersistenceError> {
        self.read();
        self.inner.find_by_fire_instance_id(conn, fire_instance_id)
    }

    fn find_by_job_key(
        &self,
        conn: &Connection,
        key: &JobKey,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.read();
        self.inner.find_by_job_key(conn, key, limit)
    }

    fn find_by_trigger_key(
        &self,
        conn: &Connection,
        key: &TriggerKey,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.read();
        self.inner.find_by_trigger_key(conn, key, limit)
    }

    fn find_by_start_time_range(
        &self,
        conn: &Connection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.read();
        self.inner.find_by_start_time_range(conn, from, to, limit)
    }

    fn find_by_end_time_range(
        &self,
        conn: &Connection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.read();
        self.inner.find_by_end_time_range(conn, from, to, limit)
    }

    fn find_in_flight(
        &self,
        conn: &Connection,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError> {
        self.read();
        self.inner.find_in_flight(conn, limit)
    }

    fn count(&self, conn: &Connection) -> Result<u64, PersistenceError> {
        self.read();
        self.inner.count(conn)
    }
}

/// In-memory sink for captured log output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a debug-level subscriber writing into the returned buffer.
pub fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = LogBuffer::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buf.contents())
}
