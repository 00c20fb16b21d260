use chrono::{DateTime, Utc};
use parkline_core::{
    Contact, Notice, Notifier, Occupant, ParkError, ParkResult, PaymentStatus, Reservation,
    RevenueSummary, SensorFeed, Session, Slot, SlotId, SlotLedger, SlotState,
};
use parkline_shared::Masked;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sessions returned by a history read when the caller gives no limit.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub slot_id: i64,
    pub occupant: Occupant,
    pub arrival_deadline: Option<DateTime<Utc>>,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub slot_id: SlotId,
    /// Present when the reservation declared a duration and was billed for it.
    pub fee: Option<Session>,
}

/// Runs the user-facing slot transitions against the ledger and fans the
/// results out to the device and notification channels.
///
/// Every outbound call is spawned with its own timeout. A failed or slow
/// channel is logged and never changes the result of the ledger operation.
pub struct SlotService {
    ledger: Arc<dyn SlotLedger>,
    sensor: Option<Arc<dyn SensorFeed>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

impl SlotService {
    pub fn new(
        ledger: Arc<dyn SlotLedger>,
        sensor: Option<Arc<dyn SensorFeed>>,
        notifiers: Vec<Arc<dyn Notifier>>,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            sensor,
            notifiers,
            timeout,
        }
    }

    pub async fn list_slots(&self) -> ParkResult<Vec<Slot>> {
        self.ledger.expire_overdue_reservations(Utc::now()).await?;
        self.ledger.list().await
    }

    pub async fn get_slot(&self, slot_id: i64) -> ParkResult<Slot> {
        let slot_id = SlotId::new(slot_id)?;
        self.ledger.get(slot_id).await
    }

    pub async fn reserve(&self, req: ReserveRequest) -> ParkResult<Slot> {
        let slot_id = SlotId::new(req.slot_id)?;
        let now = Utc::now();

        if !req.duration_hours.is_finite() || req.duration_hours < 0.0 {
            return Err(ParkError::PreconditionFailed(format!(
                "duration must be a non-negative number of hours, got {}",
                req.duration_hours
            )));
        }
        if let Some(deadline) = req.arrival_deadline {
            if deadline < now {
                return Err(ParkError::PreconditionFailed(
                    "cannot reserve a slot for a past arrival time".to_string(),
                ));
            }
        }

        // A lapsed reservation must not block a new one.
        self.ledger.expire_overdue_reservations(now).await?;

        let reservation = Reservation {
            arrival_deadline: req.arrival_deadline,
            reserved_duration_hours: req.duration_hours,
        };
        if !self.ledger.reserve(slot_id, &req.occupant, &reservation).await? {
            return Err(ParkError::PreconditionFailed(format!(
                "slot {} is not available",
                slot_id
            )));
        }

        self.set_reservation_flag(slot_id, true);
        self.log_event(format!(
            "Slot {} reserved by {}",
            slot_id, req.occupant.vehicle_number
        ));
        self.notify(
            Contact::from(&req.occupant),
            Notice::ReservationConfirmed {
                slot_id,
                vehicle_number: req.occupant.vehicle_number.clone(),
            },
        );

        self.ledger.get(slot_id).await
    }

    /// Cancel a reservation on behalf of the driver who made it.
    pub async fn cancel(&self, slot_id: i64, email: &str) -> ParkResult<CancelOutcome> {
        let slot_id = SlotId::new(slot_id)?;

        let now = Utc::now();
        let occupant = match self.ledger.get(slot_id).await?.state {
            SlotState::Reserved {
                reservation,
                ..
            } if reservation.is_overdue(now) => {
                // Lapsed holds are released without a fee, same as on a listing read.
                self.ledger.expire_overdue_reservations(now).await?;
                return Err(ParkError::PreconditionFailed(format!(
                    "reservation on slot {} has already lapsed",
                    slot_id
                )));
            }
            SlotState::Reserved { occupant, .. } => occupant,
            other => {
                return Err(ParkError::PreconditionFailed(format!(
                    "slot {} is not reserved (status {})",
                    slot_id,
                    other.status().as_str()
                )))
            }
        };

        // The ledger re-checks ownership under its write lock, so a reservation
        // replaced since the read above is refused rather than cancelled.
        let fee = self.ledger.cancel(slot_id, email, now).await?;

        self.set_reservation_flag(slot_id, false);
        match &fee {
            Some(session) => {
                self.log_event(format!(
                    "Slot {} cancelled & billed: {:.2}",
                    slot_id, session.total_amount
                ));
                self.notify(
                    Contact::from(session),
                    Notice::Bill {
                        session: session.clone(),
                    },
                );
            }
            None => {
                self.log_event(format!("Slot {} reservation cancelled", slot_id));
                self.notify(
                    Contact::from(&occupant),
                    Notice::ReservationCancelled { slot_id },
                );
            }
        }

        Ok(CancelOutcome { slot_id, fee })
    }

    /// Manual override; the poller takes the same ledger path on arrival.
    pub async fn occupy(&self, slot_id: i64) -> ParkResult<Slot> {
        let slot_id = SlotId::new(slot_id)?;
        self.ledger.occupy(slot_id, Utc::now()).await?;
        self.ledger.get(slot_id).await
    }

    pub async fn vacate(&self, slot_id: i64) -> ParkResult<Session> {
        let slot_id = SlotId::new(slot_id)?;
        let session = self
            .ledger
            .vacate(slot_id, Utc::now())
            .await?
            .ok_or_else(|| not_occupied(slot_id))?;

        self.after_vacate(&session);
        Ok(session)
    }

    /// Record who is paying for an occupied slot, then bill and free it.
    pub async fn pay_and_vacate(&self, slot_id: i64, payer: Occupant) -> ParkResult<Session> {
        let slot_id = SlotId::new(slot_id)?;

        if !self.ledger.attach_payer_details(slot_id, &payer).await? {
            return Err(not_occupied(slot_id));
        }

        let session = self
            .ledger
            .vacate(slot_id, Utc::now())
            .await?
            .ok_or_else(|| not_occupied(slot_id))?;

        info!(
            slot_id = %slot_id,
            session_id = session.id,
            payer = %Masked(&payer.user_email),
            "Bill collected at exit"
        );
        self.after_vacate(&session);
        Ok(session)
    }

    pub async fn history(&self, limit: Option<u32>) -> ParkResult<Vec<Session>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        self.ledger.list_sessions(None, Some(limit)).await
    }

    pub async fn pending_sessions(&self) -> ParkResult<Vec<Session>> {
        self.ledger
            .list_sessions(Some(PaymentStatus::Pending), None)
            .await
    }

    pub async fn revenue(&self) -> ParkResult<RevenueSummary> {
        self.ledger.revenue_summary().await
    }

    pub async fn mark_paid(&self, session_id: i64) -> ParkResult<()> {
        self.ledger.mark_paid(session_id).await
    }

    /// Send the bill for a stored session again, to whatever contact it carries.
    pub async fn send_receipt(&self, session_id: i64) -> ParkResult<Session> {
        let session = self.ledger.get_session(session_id).await?;

        let contact = Contact::from(&session);
        if contact.email.is_none() && contact.phone.is_none() {
            return Err(ParkError::PreconditionFailed(format!(
                "session {} has no contact details",
                session_id
            )));
        }

        info!(session_id, slot_id = %session.slot_id, "Receipt re-sent");
        self.notify(
            contact,
            Notice::Bill {
                session: session.clone(),
            },
        );
        Ok(session)
    }

    pub async fn clear_sessions(&self) -> ParkResult<u64> {
        let cleared = self.ledger.clear_sessions().await?;
        warn!(count = cleared, "Session history cleared by operator");
        Ok(cleared)
    }

    pub async fn reset_all(&self) -> ParkResult<()> {
        self.ledger.reset_all().await?;
        warn!("All slots reset by operator");
        Ok(())
    }

    fn after_vacate(&self, session: &Session) {
        let slot_id = session.slot_id;

        if let Some(sensor) = &self.sensor {
            let sensor = sensor.clone();
            self.fire("sensor timer reset", async move {
                sensor.reset_slot_timer(slot_id).await
            });
        }
        self.set_reservation_flag(slot_id, false);
        self.log_event(format!(
            "Slot {} vacated - Bill: {:.2}",
            slot_id, session.total_amount
        ));
        self.notify(
            Contact::from(session),
            Notice::Bill {
                session: session.clone(),
            },
        );
    }

    fn set_reservation_flag(&self, slot_id: SlotId, reserved: bool) {
        if let Some(sensor) = &self.sensor {
            let sensor = sensor.clone();
            self.fire("sensor reservation flag", async move {
                sensor.set_reservation_flag(slot_id, reserved).await
            });
        }
    }

    fn log_event(&self, message: String) {
        self.notify(Contact::none(), Notice::Event { message });
    }

    fn notify(&self, contact: Contact, notice: Notice) {
        for notifier in &self.notifiers {
            let notifier = notifier.clone();
            let contact = contact.clone();
            let notice = notice.clone();
            self.fire(notifier.channel(), async move {
                notifier.send(&contact, &notice).await
            });
        }
    }

    /// Spawn a best-effort outbound call bounded by the configured timeout.
    fn fire<F>(&self, channel: &'static str, call: F)
    where
        F: Future<Output = ParkResult<()>> + Send + 'static,
    {
        let timeout = self.timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(())) => debug!(channel, "Outbound call delivered"),
                Ok(Err(e)) => warn!(channel, error = %e, "Outbound call failed"),
                Err(_) => warn!(channel, timeout_ms = timeout.as_millis() as u64, "Outbound call timed out"),
            }
        });
    }
}

fn not_occupied(slot_id: SlotId) -> ParkError {
    ParkError::PreconditionFailed(format!("slot {} is not occupied", slot_id))
}
