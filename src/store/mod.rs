//! Persistence contract for trigger history.
//!
//! Store methods take the connection they run on, so the caller owns the
//! transactional boundary (see [`crate::storage::tx`]). A
//! `rusqlite::Transaction` derefs to a `Connection` and can be passed directly.

mod sqlite;

pub use self::sqlite::SqliteTriggerHistoryStore;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode};
use thiserror::Error;
use uuid::Uuid;

use crate::history::{JobKey, TriggerHistory, TriggerKey};

/// Storage-layer failures. Never retried by this crate.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] r2d2::Error),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("corrupt row in trigger_history: {0}")]
    Corrupt(String),

    #[error("history record has no identifier; call ensure_id() before create")]
    MissingId,
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::Constraint(e.to_string()),
            _ => Self::Sqlite(e),
        }
    }
}

/// Create, complete and query [`TriggerHistory`] records.
///
/// Implementations must tolerate concurrent calls on distinct connections:
/// unrelated creates and updates of distinct rows must not interfere.
pub trait TriggerHistoryStore: Send + Sync {
    /// Persist a new in-flight record. The record must already carry an id.
    fn create(
        &self,
        conn: &Connection,
        record: &TriggerHistory,
    ) -> Result<TriggerHistory, PersistenceError>;

    /// Set `end_time` on the in-flight record for `fire_instance_id`.
    ///
    /// Returns the number of rows changed: 0 when no in-flight record
    /// matches (unknown id, or already completed).
    fn update_end_time(
        &self,
        conn: &Connection,
        fire_instance_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<usize, PersistenceError>;

    fn find_by_id(
        &self,
        conn: &Connection,
        id: &Uuid,
    ) -> Result<Option<TriggerHistory>, PersistenceError>;

    fn find_by_fire_instance_id(
        &self,
        conn: &Connection,
        fire_instance_id: &str,
    ) -> Result<Option<TriggerHistory>, PersistenceError>;

    fn find_by_job_key(
        &self,
        conn: &Connection,
        key: &JobKey,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError>;

    fn find_by_trigger_key(
        &self,
        conn: &Connection,
        key: &TriggerKey,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError>;

    /// Records with `from <= start_time < to`.
    fn find_by_start_time_range(
        &self,
        conn: &Connection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError>;

    /// Completed records with `from <= end_time < to`.
    fn find_by_end_time_range(
        &self,
        conn: &Connection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError>;

    /// Records with no `end_time`, oldest first.
    fn find_in_flight(
        &self,
        conn: &Connection,
        limit: usize,
    ) -> Result<Vec<TriggerHistory>, PersistenceError>;

    fn count(&self, conn: &Connection) -> Result<u64, PersistenceError>;
}
