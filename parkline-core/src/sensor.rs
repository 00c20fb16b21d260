use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ParkResult, SlotId};

/// One slot as observed by the hardware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub slot_id: SlotId,
    pub is_occupied: bool,
    pub is_reserved: bool,
    pub entry_time: Option<DateTime<Utc>>,
}

/// The IoT cloud the slot sensors report to.
///
/// Read-only from the ledger's point of view. The outbound signals only drive
/// the indicators on the device side.
#[async_trait]
pub trait SensorFeed: Send + Sync {
    async fn get_all_slot_status(&self) -> ParkResult<Vec<SensorReading>>;

    async fn set_reservation_flag(&self, slot_id: SlotId, reserved: bool) -> ParkResult<()>;

    async fn reset_slot_timer(&self, slot_id: SlotId) -> ParkResult<()>;
}
