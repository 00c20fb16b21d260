pub mod slot;
pub mod session;
pub mod ledger;
pub mod sensor;
pub mod notify;

pub use slot::{Occupant, Reservation, Slot, SlotId, SlotState, SlotStatus, SLOT_COUNT};
pub use session::{PaymentStatus, RevenueSummary, Session, SessionKind};
pub use ledger::SlotLedger;
pub use sensor::{SensorFeed, SensorReading};
pub use notify::{Contact, Notice, Notifier};

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum ParkError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
    #[error("Invalid billing interval: exit {exit} precedes entry {entry}")]
    InvalidInterval {
        entry: DateTime<Utc>,
        exit: DateTime<Utc>,
    },
    #[error("Store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The three outcome classes callers route on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NotFound,
    PreconditionFailed,
    Failed,
}

impl ParkError {
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ParkError::Store(Box::new(err))
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ParkError::NotFound(_) => Outcome::NotFound,
            ParkError::PreconditionFailed(_) => Outcome::PreconditionFailed,
            ParkError::CollaboratorUnavailable(_)
            | ParkError::InvalidInterval { .. }
            | ParkError::Store(_) => Outcome::Failed,
        }
    }
}

pub type ParkResult<T> = Result<T, ParkError>;
