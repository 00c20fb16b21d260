use parkline_engine::{ReconciliationPoller, SlotService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SlotService>,
    /// Absent when no sensor feed is configured.
    pub poller: Option<Arc<ReconciliationPoller>>,
}
