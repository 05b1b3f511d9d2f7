use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompletedExecutionInstruction, FireContext, Trigger};
use crate::history::{JobKey, TriggerKey};

/// A lifecycle event as posted by a remote scheduler node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TriggerEvent {
    Fired {
        trigger: TriggerKey,
        job: JobKey,
        fire_instance_id: String,
        fire_time: DateTime<Utc>,
    },
    Misfired {
        trigger: TriggerKey,
        job: JobKey,
    },
    Completed {
        trigger: TriggerKey,
        job: JobKey,
        fire_instance_id: String,
        fire_time: DateTime<Utc>,
        #[serde(default)]
        completed_at: Option<DateTime<Utc>>,
        #[serde(default)]
        instruction: CompletedExecutionInstruction,
    },
}

impl TriggerEvent {
    pub fn trigger(&self) -> Trigger {
        match self {
            Self::Fired { trigger, job, .. }
            | Self::Misfired { trigger, job }
            | Self::Completed { trigger, job, .. } => Trigger::new(trigger.clone(), job.clone()),
        }
    }

    /// Fire context for fired/completed events; misfires have none.
    pub fn context(&self) -> Option<FireContext> {
        match self {
            Self::Fired {
                fire_instance_id,
                fire_time,
                ..
            } => Some(FireContext::new(fire_instance_id.clone(), *fire_time)),
            Self::Completed {
                fire_instance_id,
                fire_time,
                completed_at,
                ..
            } => Some(FireContext {
                fire_instance_id: fire_instance_id.clone(),
                fire_time: *fire_time,
                completed_at: *completed_at,
            }),
            Self::Misfired { .. } => None,
        }
    }

    pub fn fire_instance_id(&self) -> Option<&str> {
        match self {
            Self::Fired {
                fire_instance_id, ..
            }
            | Self::Completed {
                fire_instance_id, ..
            } => Some(fire_instance_id.as_str()),
            Self::Misfired { .. } => None,
        }
    }
}
