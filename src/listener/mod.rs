//! The trigger lifecycle listener.
//!
//! Per fire instance the history moves `NONE -> FIRED -> COMPLETED`:
//! a fired event creates the in-flight record, the matching completed event
//! stamps its end time. Veto checks and misfires never touch the store.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info_span, warn, Span};

use crate::history::TriggerHistory;
use crate::scheduler::{CompletedExecutionInstruction, FireContext, Trigger, TriggerListener};
use crate::storage::{tx, Pool};
use crate::store::{PersistenceError, TriggerHistoryStore};

/// Name reported to the scheduler.
pub const LISTENER_NAME: &str = "GlobalTriggerListener";

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener requires a {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Records every firing of every trigger into the history store.
pub struct GlobalTriggerListener {
    pool: Pool,
    store: Arc<dyn TriggerHistoryStore>,
    span: Span,
}

impl GlobalTriggerListener {
    pub fn new(pool: Pool, store: Arc<dyn TriggerHistoryStore>) -> Self {
        Self {
            pool,
            store,
            span: default_span(),
        }
    }

    pub fn builder() -> GlobalTriggerListenerBuilder {
        GlobalTriggerListenerBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn TriggerHistoryStore> {
        &self.store
    }

    /// Create the in-flight record for a firing on a connection the caller
    /// controls. Pass an open transaction to make the record part of the
    /// caller's unit of work.
    pub fn record_fired_in(
        &self,
        conn: &Connection,
        trigger: &Trigger,
        context: &FireContext,
    ) -> Result<TriggerHistory, PersistenceError> {
        let mut history = TriggerHistory::fired(
            context.fire_instance_id.clone(),
            trigger.job_key.clone(),
            trigger.key.clone(),
            context.fire_time,
        );
        history.ensure_id();

        self.store.create(conn, &history)
    }
}

fn default_span() -> Span {
    info_span!("trigger_history", listener = LISTENER_NAME)
}

impl TriggerListener for GlobalTriggerListener {
    fn name(&self) -> &str {
        LISTENER_NAME
    }

    fn veto_job_execution(&self, _trigger: &Trigger, _context: &FireContext) -> bool {
        false
    }

    fn trigger_misfired(&self, trigger: &Trigger) {
        let _enter = self.span.enter();
        debug!(trigger_key = %trigger.key, job_key = %trigger.job_key, "trigger misfired, not recorded");
    }

    fn trigger_fired(&self, trigger: &Trigger, context: &FireContext) -> Result<(), ListenerError> {
        let _enter = self.span.enter();
        debug!(
            fire_instance_id = %context.fire_instance_id,
            trigger_key = %trigger.key,
            job_key = %trigger.job_key,
            "trigger fired"
        );

        tx::in_transaction(&self.pool, |tx| self.record_fired_in(tx, trigger, context))?;
        Ok(())
    }

    fn trigger_complete(
        &self,
        trigger: &Trigger,
        context: &FireContext,
        instruction: CompletedExecutionInstruction,
    ) -> Result<usize, ListenerError> {
        let _enter = self.span.enter();
        debug!(
            fire_instance_id = %context.fire_instance_id,
            trigger_key = %trigger.key,
            job_key = %trigger.job_key,
            ?instruction,
            "trigger completed"
        );

        let end_time = context.completed_at.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let changed = tx::in_transaction(&self.pool, |tx| {
            self.store
                .update_end_time(tx, &context.fire_instance_id, end_time)
        })?;

        if changed == 0 {
            warn!(
                fire_instance_id = %context.fire_instance_id,
                trigger_key = %trigger.key,
                job_key = %trigger.job_key,
                "completed event has no in-flight history record"
            );
        }
        Ok(changed)
    }
}

/// Builder that checks every collaborator is present before the listener
/// is handed to a scheduler.
#[derive(Default)]
pub struct GlobalTriggerListenerBuilder {
    pool: Option<Pool>,
    store: Option<Arc<dyn TriggerHistoryStore>>,
    span: Option<Span>,
}

impl GlobalTriggerListenerBuilder {
    pub fn pool(mut self, pool: Pool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn store(mut self, store: Arc<dyn TriggerHistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Parent span for every log line the listener emits.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<GlobalTriggerListener, ListenerError> {
        let store = self
            .store
            .ok_or(ListenerError::MissingCollaborator("history store"))?;
        let pool = self
            .pool
            .ok_or(ListenerError::MissingCollaborator("connection pool"))?;

        Ok(GlobalTriggerListener {
            pool,
            store,
            span: self.span.unwrap_or_else(default_span),
        })
    }
}
