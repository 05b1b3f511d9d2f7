use std::sync::Arc;

use crate::scheduler::Dispatcher;
use crate::storage::Pool;
use crate::store::TriggerHistoryStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub store: Arc<dyn TriggerHistoryStore>,
    pub dispatcher: Arc<Dispatcher>,
}
