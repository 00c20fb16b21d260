use chrono::{DateTime, Utc};
use parkline_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ParkError;

/// Number of physical parking spaces managed by the system.
pub const SLOT_COUNT: u8 = 3;

/// Identity of a physical slot, always within `1..=SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SlotId(u8);

impl SlotId {
    pub fn new(raw: i64) -> Result<Self, ParkError> {
        if (1..=SLOT_COUNT as i64).contains(&raw) {
            Ok(Self(raw as u8))
        } else {
            Err(ParkError::NotFound(format!("slot {}", raw)))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All slots in stable id order.
    pub fn all() -> impl Iterator<Item = SlotId> {
        (1..=SLOT_COUNT).map(SlotId)
    }
}

impl TryFrom<i64> for SlotId {
    type Error = ParkError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        SlotId::new(raw)
    }
}

impl From<SlotId> for i64 {
    fn from(id: SlotId) -> Self {
        id.0 as i64
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is using (or has booked) a slot.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occupant {
    pub vehicle_number: String,
    pub user_email: String,
    pub user_phone: String,
}

impl fmt::Debug for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Occupant")
            .field("vehicle_number", &self.vehicle_number)
            .field("user_email", &Masked(&self.user_email))
            .field("user_phone", &Masked(&self.user_phone))
            .finish()
    }
}

impl Occupant {
    /// Whether `email` names this occupant. Surrounding whitespace and ASCII case are ignored.
    pub fn email_matches(&self, email: &str) -> bool {
        self.user_email.trim().eq_ignore_ascii_case(email.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    /// Latest time the vehicle may arrive. `None` means the hold never lapses on its own.
    pub arrival_deadline: Option<DateTime<Utc>>,
    pub reserved_duration_hours: f64,
}

impl Reservation {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.arrival_deadline.is_some_and(|deadline| deadline < now)
    }
}

/// Flat status of a slot, used for storage and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Empty,
    Reserved,
    Occupied,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Empty => "EMPTY",
            SlotStatus::Reserved => "RESERVED",
            SlotStatus::Occupied => "OCCUPIED",
        }
    }
}

impl std::str::FromStr for SlotStatus {
    type Err = ParkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(SlotStatus::Empty),
            "RESERVED" => Ok(SlotStatus::Reserved),
            "OCCUPIED" => Ok(SlotStatus::Occupied),
            other => Err(ParkError::Store(
                format!("unknown slot status {:?}", other).into(),
            )),
        }
    }
}

/// Slot state with exactly one active payload.
///
/// A slot is never reserved and occupied at once. An occupied slot may have no
/// occupant when the sensor detected an unknown vehicle; payer details are
/// attached before billing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotState {
    Empty,
    Reserved {
        occupant: Occupant,
        reservation: Reservation,
    },
    Occupied {
        occupant: Option<Occupant>,
        entry_time: DateTime<Utc>,
    },
}

impl SlotState {
    pub fn status(&self) -> SlotStatus {
        match self {
            SlotState::Empty => SlotStatus::Empty,
            SlotState::Reserved { .. } => SlotStatus::Reserved,
            SlotState::Occupied { .. } => SlotStatus::Occupied,
        }
    }

    pub fn occupant(&self) -> Option<&Occupant> {
        match self {
            SlotState::Empty => None,
            SlotState::Reserved { occupant, .. } => Some(occupant),
            SlotState::Occupied { occupant, .. } => occupant.as_ref(),
        }
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            SlotState::Reserved { reservation, .. } => Some(reservation),
            _ => None,
        }
    }

    pub fn entry_time(&self) -> Option<DateTime<Utc>> {
        match self {
            SlotState::Occupied { entry_time, .. } => Some(*entry_time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub slot_id: SlotId,
    #[serde(flatten)]
    pub state: SlotState,
}

impl Slot {
    pub fn status(&self) -> SlotStatus {
        self.state.status()
    }

    pub fn is_occupied(&self) -> bool {
        self.status() == SlotStatus::Occupied
    }
}
