use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Occupant, ParkResult, PaymentStatus, Reservation, RevenueSummary, Session, Slot, SlotId};

/// Authoritative record of slot occupancy and closed sessions.
///
/// Implementations serialize conflicting writes to the same slot. `reserve` is a
/// compare-and-set: of two concurrent reservations on an empty slot exactly one
/// returns `true`.
#[async_trait]
pub trait SlotLedger: Send + Sync {
    async fn get(&self, slot_id: SlotId) -> ParkResult<Slot>;

    /// All slots ordered by id.
    async fn list(&self) -> ParkResult<Vec<Slot>>;

    /// Reserve an empty slot. Returns `false` without changing anything if the
    /// slot is not empty.
    async fn reserve(
        &self,
        slot_id: SlotId,
        occupant: &Occupant,
        reservation: &Reservation,
    ) -> ParkResult<bool>;

    /// Clear a reservation held under `email`. Produces a pending cancellation-fee
    /// session when the reservation declared a positive duration.
    ///
    /// The ownership check and the clear happen under the same write lock. Fails
    /// with `PreconditionFailed`, changing nothing, if the slot is not reserved or
    /// is reserved by someone else.
    async fn cancel(
        &self,
        slot_id: SlotId,
        email: &str,
        at: DateTime<Utc>,
    ) -> ParkResult<Option<Session>>;

    /// Clear every reservation whose arrival deadline is before `now`. No fee.
    async fn expire_overdue_reservations(&self, now: DateTime<Utc>) -> ParkResult<u64>;

    /// Mark the slot occupied from `entry_time`, whatever it was before.
    async fn occupy(&self, slot_id: SlotId, entry_time: DateTime<Utc>) -> ParkResult<()>;

    /// Mark the slot occupied unless it already is. Returns `false` and leaves
    /// the running stay untouched when the slot was occupied.
    async fn occupy_if_vacant(&self, slot_id: SlotId, entry_time: DateTime<Utc>) -> ParkResult<bool>;

    /// Replace occupant details on an occupied slot, keeping the entry time.
    async fn attach_payer_details(&self, slot_id: SlotId, occupant: &Occupant) -> ParkResult<bool>;

    /// Close the parking session on an occupied slot. `None` when the slot was
    /// not occupied.
    async fn vacate(&self, slot_id: SlotId, exit_time: DateTime<Utc>) -> ParkResult<Option<Session>>;

    /// Idempotent. Fails with `NotFound` for an unknown session id.
    async fn mark_paid(&self, session_id: i64) -> ParkResult<()>;

    async fn get_session(&self, session_id: i64) -> ParkResult<Session>;

    /// Newest first.
    async fn list_sessions(
        &self,
        status: Option<PaymentStatus>,
        limit: Option<u32>,
    ) -> ParkResult<Vec<Session>>;

    async fn revenue_summary(&self) -> ParkResult<RevenueSummary>;

    async fn reset_all(&self) -> ParkResult<()>;

    /// Delete every session. Returns the number removed.
    async fn clear_sessions(&self) -> ParkResult<u64>;
}
