//! Trigger execution history -- one record per observed fire instance.

mod key;

pub use self::key::{JobKey, TriggerKey, DEFAULT_GROUP};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a history record is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InFlight,
    Completed,
}

/// A record of one trigger firing.
///
/// `end_time == None` means the execution is in flight. The tracker does not
/// distinguish success from failure, only completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerHistory {
    pub id: Option<Uuid>,
    pub fire_instance_id: String,
    pub job_key: JobKey,
    pub trigger_key: TriggerKey,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TriggerHistory {
    /// Build an in-flight record without an identifier. `start_time` is
    /// truncated to the microsecond precision the store persists.
    pub fn fired(
        fire_instance_id: impl Into<String>,
        job_key: JobKey,
        trigger_key: TriggerKey,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            fire_instance_id: fire_instance_id.into(),
            job_key,
            trigger_key,
            start_time: start_time.trunc_subsecs(6),
            end_time: None,
        }
    }

    /// Assign a fresh identifier if none is set. Idempotent.
    pub fn ensure_id(&mut self) -> Uuid {
        *self.id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn status(&self) -> RunStatus {
        match self.end_time {
            Some(_) => RunStatus::Completed,
            None => RunStatus::InFlight,
        }
    }

    /// Wall-clock duration of a completed run.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Identity equality: two records are equal iff both carry the same id.
/// A record without an id is only equal to itself (the same instance).
impl PartialEq for TriggerHistory {
    fn eq(&self, other: &Self) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => std::ptr::eq(self, other),
        }
    }
}
