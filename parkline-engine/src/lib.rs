pub mod orchestrator;
pub mod poller;

pub use orchestrator::{CancelOutcome, ReserveRequest, SlotService, DEFAULT_HISTORY_LIMIT};
pub use poller::ReconciliationPoller;
