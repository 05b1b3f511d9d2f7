//! The surface an external scheduler drives: triggers, fire contexts, and
//! the listener interface notified on every trigger lifecycle event.

pub mod dispatch;
mod event;

pub use self::dispatch::Dispatcher;
pub use self::event::TriggerEvent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{JobKey, TriggerKey};
use crate::listener::ListenerError;

/// The trigger that fired, and the job it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
}

impl Trigger {
    pub fn new(key: TriggerKey, job_key: JobKey) -> Self {
        Self { key, job_key }
    }
}

/// Per-firing context handed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireContext {
    /// Scheduler-assigned id of this concrete firing.
    pub fire_instance_id: String,
    pub fire_time: DateTime<Utc>,
    /// Set by the scheduler when the job finishes; absent on fired events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FireContext {
    pub fn new(fire_instance_id: impl Into<String>, fire_time: DateTime<Utc>) -> Self {
        Self {
            fire_instance_id: fire_instance_id.into(),
            fire_time,
            completed_at: None,
        }
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

/// What the scheduler will do with the trigger after a job completes.
/// Reported to listeners for information only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletedExecutionInstruction {
    #[default]
    Noop,
    ReExecuteJob,
    SetTriggerComplete,
    DeleteTrigger,
    SetAllJobTriggersComplete,
    SetTriggerError,
    SetAllJobTriggersError,
}

/// Callbacks the scheduler invokes on its own worker threads.
///
/// Callbacks for distinct fire instances may run concurrently; for a single
/// fire instance `trigger_fired` happens before `trigger_complete`.
pub trait TriggerListener: Send + Sync {
    fn name(&self) -> &str;

    /// Asked before a job executes; `true` blocks the execution.
    fn veto_job_execution(&self, trigger: &Trigger, context: &FireContext) -> bool;

    fn trigger_misfired(&self, trigger: &Trigger);

    fn trigger_fired(&self, trigger: &Trigger, context: &FireContext) -> Result<(), ListenerError>;

    /// Returns the number of history rows the completion touched.
    fn trigger_complete(
        &self,
        trigger: &Trigger,
        context: &FireContext,
        instruction: CompletedExecutionInstruction,
    ) -> Result<usize, ListenerError>;
}
