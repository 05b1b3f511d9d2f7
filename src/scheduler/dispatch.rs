//! Event delivery to registered listeners.
//!
//! Each listener callback runs behind its own error boundary: a failed
//! history write is logged and the next listener (and the next firing)
//! proceeds. Nothing is retried.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::{TriggerEvent, TriggerListener};

/// Outcome of delivering one event to every listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Some listener vetoed the execution (fired events only).
    pub vetoed: bool,
    /// Listeners whose callback returned an error.
    pub failures: usize,
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    listeners: Vec<Arc<dyn TriggerListener>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn TriggerListener>) {
        debug!(listener = %listener.name(), "listener registered");
        self.listeners.push(listener);
    }

    pub fn with_listener(mut self, listener: Arc<dyn TriggerListener>) -> Self {
        self.register(listener);
        self
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver `event` synchronously on the calling thread.
    pub fn deliver(&self, event: &TriggerEvent) -> Delivery {
        let trigger = event.trigger();
        let mut delivery = Delivery::default();

        match (event, event.context()) {
            (TriggerEvent::Fired { .. }, Some(ctx)) => {
                for l in &self.listeners {
                    if let Err(e) = l.trigger_fired(&trigger, &ctx) {
                        warn!(
                            listener = %l.name(),
                            fire_instance_id = %ctx.fire_instance_id,
                            error = %e,
                            "listener failed on trigger fired"
                        );
                        delivery.failures += 1;
                    }
                }
                for l in &self.listeners {
                    if l.veto_job_execution(&trigger, &ctx) {
                        debug!(listener = %l.name(), fire_instance_id = %ctx.fire_instance_id, "execution vetoed");
                        delivery.vetoed = true;
                    }
                }
            }
            (TriggerEvent::Completed { instruction, .. }, Some(ctx)) => {
                for l in &self.listeners {
                    if let Err(e) = l.trigger_complete(&trigger, &ctx, *instruction) {
                        warn!(
                            listener = %l.name(),
                            fire_instance_id = %ctx.fire_instance_id,
                            error = %e,
                            "listener failed on trigger complete"
                        );
                        delivery.failures += 1;
                    }
                }
            }
            _ => {
                for l in &self.listeners {
                    l.trigger_misfired(&trigger);
                }
            }
        }

        delivery
    }
}
