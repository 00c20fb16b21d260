use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ParkError, SlotId};

/// Payment state of a closed session. Only ever moves Pending -> Paid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ParkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            other => Err(ParkError::Store(
                format!("unknown payment status {:?}", other).into(),
            )),
        }
    }
}

/// What produced the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    /// A vehicle physically used the slot.
    Parking,
    /// A paid-duration reservation was cancelled.
    CancellationFee,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Parking => "PARKING",
            SessionKind::CancellationFee => "CANCELLATION_FEE",
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = ParkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARKING" => Ok(SessionKind::Parking),
            "CANCELLATION_FEE" => Ok(SessionKind::CancellationFee),
            other => Err(ParkError::Store(
                format!("unknown session kind {:?}", other).into(),
            )),
        }
    }
}

/// A closed, billable record. Immutable after creation except for `payment_status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: i64,
    pub slot_id: SlotId,
    pub kind: SessionKind,
    pub vehicle_number: Option<String>,
    pub user_email: Option<String>,
    pub user_phone: Option<String>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub base_charge: f64,
    pub variable_charge: f64,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RevenueSummary {
    /// Sum of `total_amount` over paid sessions.
    pub total_amount: f64,
    /// Number of paid sessions.
    pub count: i64,
}
