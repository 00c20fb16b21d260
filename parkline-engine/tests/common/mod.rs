#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parkline_billing::BillingCalculator;
use parkline_core::{
    Contact, Notice, Notifier, Occupant, ParkError, ParkResult, PaymentStatus, Reservation,
    RevenueSummary, SensorFeed, SensorReading, Session, Slot, SlotId, SlotLedger,
};
use parkline_store::{DbClient, SqliteLedger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub async fn ledger() -> Arc<SqliteLedger> {
    let db = DbClient::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    Arc::new(SqliteLedger::new(&db, BillingCalculator::default()))
}

pub fn driver() -> Occupant {
    Occupant {
        vehicle_number: "KA01AB1234".to_string(),
        user_email: "driver@example.com".to_string(),
        user_phone: "+919876543210".to_string(),
    }
}

pub fn slot(id: i64) -> SlotId {
    SlotId::new(id).unwrap()
}

/// A write another caller makes between a read and the write that follows it.
pub enum Interleaved {
    /// The holder cancels and a different driver takes the slot.
    ReplaceReservation {
        slot_id: SlotId,
        holder_email: String,
        occupant: Occupant,
        reservation: Reservation,
    },
    /// An operator marks the slot occupied by hand.
    ManualOccupy {
        slot_id: SlotId,
        entry_time: DateTime<Utc>,
    },
}

/// Wraps a real ledger and applies one interleaved write right after the first
/// `get` or `list`, so the caller acts on a stale read.
pub struct InterleavingLedger {
    inner: Arc<SqliteLedger>,
    pending: Mutex<Option<Interleaved>>,
}

impl InterleavingLedger {
    pub fn new(inner: Arc<SqliteLedger>, write: Interleaved) -> Arc<Self> {
        Arc::new(Self {
            inner,
            pending: Mutex::new(Some(write)),
        })
    }

    async fn interleave(&self) {
        let write = self.pending.lock().unwrap().take();
        match write {
            Some(Interleaved::ReplaceReservation {
                slot_id,
                holder_email,
                occupant,
                reservation,
            }) => {
                self.inner.cancel(slot_id, &holder_email, Utc::now()).await.unwrap();
                assert!(self.inner.reserve(slot_id, &occupant, &reservation).await.unwrap());
            }
            Some(Interleaved::ManualOccupy { slot_id, entry_time }) => {
                self.inner.occupy(slot_id, entry_time).await.unwrap();
            }
            None => {}
        }
    }
}

#[async_trait]
impl SlotLedger for InterleavingLedger {
    async fn get(&self, slot_id: SlotId) -> ParkResult<Slot> {
        let slot = self.inner.get(slot_id).await;
        self.interleave().await;
        slot
    }

    async fn list(&self) -> ParkResult<Vec<Slot>> {
        let slots = self.inner.list().await;
        self.interleave().await;
        slots
    }

    async fn reserve(
        &self,
        slot_id: SlotId,
        occupant: &Occupant,
        reservation: &Reservation,
    ) -> ParkResult<bool> {
        self.inner.reserve(slot_id, occupant, reservation).await
    }

    async fn cancel(
        &self,
        slot_id: SlotId,
        email: &str,
        at: DateTime<Utc>,
    ) -> ParkResult<Option<Session>> {
        self.inner.cancel(slot_id, email, at).await
    }

    async fn expire_overdue_reservations(&self, now: DateTime<Utc>) -> ParkResult<u64> {
        self.inner.expire_overdue_reservations(now).await
    }

    async fn occupy(&self, slot_id: SlotId, entry_time: DateTime<Utc>) -> ParkResult<()> {
        self.inner.occupy(slot_id, entry_time).await
    }

    async fn occupy_if_vacant(&self, slot_id: SlotId, entry_time: DateTime<Utc>) -> ParkResult<bool> {
        self.inner.occupy_if_vacant(slot_id, entry_time).await
    }

    async fn attach_payer_details(&self, slot_id: SlotId, occupant: &Occupant) -> ParkResult<bool> {
        self.inner.attach_payer_details(slot_id, occupant).await
    }

    async fn vacate(&self, slot_id: SlotId, exit_time: DateTime<Utc>) -> ParkResult<Option<Session>> {
        self.inner.vacate(slot_id, exit_time).await
    }

    async fn mark_paid(&self, session_id: i64) -> ParkResult<()> {
        self.inner.mark_paid(session_id).await
    }

    async fn get_session(&self, session_id: i64) -> ParkResult<Session> {
        self.inner.get_session(session_id).await
    }

    async fn list_sessions(
        &self,
        status: Option<PaymentStatus>,
        limit: Option<u32>,
    ) -> ParkResult<Vec<Session>> {
        self.inner.list_sessions(status, limit).await
    }

    async fn revenue_summary(&self) -> ParkResult<RevenueSummary> {
        self.inner.revenue_summary().await
    }

    async fn reset_all(&self) -> ParkResult<()> {
        self.inner.reset_all().await
    }

    async fn clear_sessions(&self) -> ParkResult<u64> {
        self.inner.clear_sessions().await
    }
}

/// Forwards every notice it is handed to the test.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<(Contact, Notice)>,
}

impl RecordingNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(Contact, Notice)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, contact: &Contact, notice: &Notice) -> ParkResult<()> {
        let _ = self.tx.send((contact.clone(), notice.clone()));
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn channel(&self) -> &'static str {
        "failing"
    }

    async fn send(&self, _contact: &Contact, _notice: &Notice) -> ParkResult<()> {
        Err(ParkError::CollaboratorUnavailable("smtp down".to_string()))
    }
}

pub struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    fn channel(&self) -> &'static str {
        "hanging"
    }

    async fn send(&self, _contact: &Contact, _notice: &Notice) -> ParkResult<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    ReservationFlag(SlotId, bool),
    TimerReset(SlotId),
}

/// A sensor feed whose readings are set by the test.
pub struct ScriptedSensor {
    readings: Mutex<Vec<SensorReading>>,
    offline: AtomicBool,
    signals: mpsc::UnboundedSender<Signal>,
}

impl ScriptedSensor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sensor = Self {
            readings: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            signals: tx,
        };
        (Arc::new(sensor), rx)
    }

    pub fn report(&self, occupied: &[i64]) {
        let readings = SlotId::all()
            .map(|slot_id| SensorReading {
                slot_id,
                is_occupied: occupied.contains(&i64::from(slot_id)),
                is_reserved: false,
                entry_time: None,
            })
            .collect();
        *self.readings.lock().unwrap() = readings;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl SensorFeed for ScriptedSensor {
    async fn get_all_slot_status(&self) -> ParkResult<Vec<SensorReading>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ParkError::CollaboratorUnavailable("sensor cloud offline".to_string()));
        }
        Ok(self.readings.lock().unwrap().clone())
    }

    async fn set_reservation_flag(&self, slot_id: SlotId, reserved: bool) -> ParkResult<()> {
        let _ = self.signals.send(Signal::ReservationFlag(slot_id, reserved));
        Ok(())
    }

    async fn reset_slot_timer(&self, slot_id: SlotId) -> ParkResult<()> {
        let _ = self.signals.send(Signal::TimerReset(slot_id));
        Ok(())
    }
}

/// Collect everything delivered within a short window.
pub async fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        out.push(item);
    }
    out
}
