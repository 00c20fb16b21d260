use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Occupant, ParkResult, Session, SlotId};

/// Where a notice should go. Each sink picks the field it understands.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Contact {
    pub fn none() -> Self {
        Self::default()
    }
}

impl From<&Occupant> for Contact {
    fn from(occupant: &Occupant) -> Self {
        Self {
            email: Some(occupant.user_email.clone()),
            phone: Some(occupant.user_phone.clone()),
        }
    }
}

impl From<&Session> for Contact {
    fn from(session: &Session) -> Self {
        Self {
            email: session.user_email.clone(),
            phone: session.user_phone.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    ReservationConfirmed {
        slot_id: SlotId,
        vehicle_number: String,
    },
    ReservationCancelled {
        slot_id: SlotId,
    },
    Bill {
        session: Session,
    },
    /// A line for the cloud event log.
    Event {
        message: String,
    },
}

impl Notice {
    /// Whether this notice is meant for a person rather than the event log.
    pub fn is_personal(&self) -> bool {
        !matches!(self, Notice::Event { .. })
    }

    pub fn subject(&self) -> String {
        match self {
            Notice::ReservationConfirmed { slot_id, .. } => {
                format!("Parking Reservation Confirmed - Slot {}", slot_id)
            }
            Notice::ReservationCancelled { slot_id } => {
                format!("Reservation Cancelled - Slot {}", slot_id)
            }
            Notice::Bill { session } => format!("Parking Bill - Slot {}", session.slot_id),
            Notice::Event { .. } => "Parking Event".to_string(),
        }
    }

    pub fn text(&self) -> String {
        match self {
            Notice::ReservationConfirmed {
                slot_id,
                vehicle_number,
            } => format!(
                "Slot {} is reserved for vehicle {}. Please arrive before your reservation lapses.",
                slot_id, vehicle_number
            ),
            Notice::ReservationCancelled { slot_id } => {
                format!("Your reservation for slot {} has been cancelled.", slot_id)
            }
            Notice::Bill { session } => format!(
                "Slot {} | Vehicle {} | {} to {} | {} min | Base {:.2} + Usage {:.2} = Total {:.2}",
                session.slot_id,
                session.vehicle_number.as_deref().unwrap_or("UNKNOWN"),
                session.entry_time.format("%Y-%m-%d %H:%M:%S"),
                session.exit_time.format("%Y-%m-%d %H:%M:%S"),
                session.duration_minutes,
                session.base_charge,
                session.variable_charge,
                session.total_amount,
            ),
            Notice::Event { message } => message.clone(),
        }
    }
}

/// A best-effort outbound channel (email, WhatsApp, cloud event log).
///
/// Failures are reported but never affect the ledger operation that triggered
/// the notice.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn send(&self, contact: &Contact, notice: &Notice) -> ParkResult<()>;
}
