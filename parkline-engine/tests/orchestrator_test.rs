mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use parkline_core::{
    Notice, Notifier, Occupant, ParkError, PaymentStatus, Reservation, SessionKind, SlotLedger,
    SlotState, SlotStatus,
};
use parkline_engine::{ReserveRequest, SlotService};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn request(slot_id: i64, hours: f64) -> ReserveRequest {
    ReserveRequest {
        slot_id,
        occupant: driver(),
        arrival_deadline: Some(Utc::now() + ChronoDuration::minutes(30)),
        duration_hours: hours,
    }
}

fn reservation(hours: f64) -> Reservation {
    Reservation {
        arrival_deadline: Some(Utc::now() + ChronoDuration::minutes(30)),
        reserved_duration_hours: hours,
    }
}

fn service(
    ledger: Arc<dyn SlotLedger>,
    sensor: Option<Arc<ScriptedSensor>>,
    notifiers: Vec<Arc<dyn Notifier>>,
) -> SlotService {
    let sensor = sensor.map(|s| s as Arc<dyn parkline_core::SensorFeed>);
    SlotService::new(ledger, sensor, notifiers, Duration::from_millis(100))
}

#[tokio::test]
async fn test_unknown_slot_is_not_found_everywhere() {
    let svc = service(ledger().await, None, vec![]);

    for id in [0, 4, -1] {
        assert!(matches!(svc.get_slot(id).await, Err(ParkError::NotFound(_))));
        assert!(matches!(svc.reserve(request(id, 1.0)).await, Err(ParkError::NotFound(_))));
        assert!(matches!(svc.cancel(id, "a@b.com").await, Err(ParkError::NotFound(_))));
        assert!(matches!(svc.occupy(id).await, Err(ParkError::NotFound(_))));
        assert!(matches!(svc.vacate(id).await, Err(ParkError::NotFound(_))));
        assert!(matches!(
            svc.pay_and_vacate(id, driver()).await,
            Err(ParkError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_reserve_confirms_and_signals_device() {
    let (notifier, mut notices) = RecordingNotifier::new();
    let (sensor, mut signals) = ScriptedSensor::new();
    let svc = service(ledger().await, Some(sensor), vec![notifier as Arc<dyn Notifier>]);

    let slot_state = svc.reserve(request(1, 2.0)).await.unwrap();
    assert_eq!(slot_state.status(), SlotStatus::Reserved);

    let signals = drain(&mut signals).await;
    assert_eq!(signals, vec![Signal::ReservationFlag(slot(1), true)]);

    let notices = drain(&mut notices).await;
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().any(|(contact, notice)| {
        matches!(notice, Notice::ReservationConfirmed { .. })
            && contact.email.as_deref() == Some("driver@example.com")
    }));
    assert!(notices
        .iter()
        .any(|(_, notice)| matches!(notice, Notice::Event { message } if message.contains("KA01AB1234"))));
}

#[tokio::test]
async fn test_reserve_rejects_taken_slot_and_bad_input() {
    let svc = service(ledger().await, None, vec![]);
    svc.reserve(request(1, 1.0)).await.unwrap();

    let err = svc.reserve(request(1, 1.0)).await.unwrap_err();
    assert!(matches!(err, ParkError::PreconditionFailed(_)));

    let mut past = request(2, 1.0);
    past.arrival_deadline = Some(Utc::now() - ChronoDuration::minutes(1));
    assert!(matches!(
        svc.reserve(past).await,
        Err(ParkError::PreconditionFailed(_))
    ));

    assert!(matches!(
        svc.reserve(request(2, -1.0)).await,
        Err(ParkError::PreconditionFailed(_))
    ));
    assert_eq!(svc.get_slot(2).await.unwrap().state, SlotState::Empty);
}

#[tokio::test]
async fn test_cancel_requires_matching_email() {
    let (notifier, mut notices) = RecordingNotifier::new();
    let svc = service(ledger().await, None, vec![notifier as Arc<dyn Notifier>]);
    svc.reserve(request(2, 2.0)).await.unwrap();
    drain(&mut notices).await;

    let err = svc.cancel(2, "someone.else@example.com").await.unwrap_err();
    assert!(matches!(err, ParkError::PreconditionFailed(_)));
    assert_eq!(svc.get_slot(2).await.unwrap().status(), SlotStatus::Reserved);

    let outcome = svc.cancel(2, " Driver@Example.com ").await.unwrap();
    let fee = outcome.fee.unwrap();
    assert_eq!(fee.kind, SessionKind::CancellationFee);
    assert_eq!(fee.total_amount, 230.0);
    assert_eq!(svc.get_slot(2).await.unwrap().state, SlotState::Empty);

    let notices = drain(&mut notices).await;
    assert!(notices
        .iter()
        .any(|(_, notice)| matches!(notice, Notice::Bill { session } if session.id == fee.id)));
}

#[tokio::test]
async fn test_cancel_without_duration_sends_cancellation() {
    let (notifier, mut notices) = RecordingNotifier::new();
    let (sensor, mut signals) = ScriptedSensor::new();
    let svc = service(ledger().await, Some(sensor), vec![notifier as Arc<dyn Notifier>]);
    svc.reserve(request(3, 0.0)).await.unwrap();
    drain(&mut notices).await;
    drain(&mut signals).await;

    let outcome = svc.cancel(3, "driver@example.com").await.unwrap();
    assert!(outcome.fee.is_none());

    let notices = drain(&mut notices).await;
    assert!(notices
        .iter()
        .any(|(_, notice)| matches!(notice, Notice::ReservationCancelled { .. })));
    assert!(!notices
        .iter()
        .any(|(_, notice)| matches!(notice, Notice::Bill { .. })));
    assert_eq!(
        drain(&mut signals).await,
        vec![Signal::ReservationFlag(slot(3), false)]
    );
}

#[tokio::test]
async fn test_cancel_on_empty_slot_is_precondition_failure() {
    let svc = service(ledger().await, None, vec![]);
    assert!(matches!(
        svc.cancel(1, "driver@example.com").await,
        Err(ParkError::PreconditionFailed(_))
    ));
}

#[tokio::test]
async fn test_vacate_bills_and_resets_device() {
    let (notifier, mut notices) = RecordingNotifier::new();
    let (sensor, mut signals) = ScriptedSensor::new();
    let svc = service(ledger().await, Some(sensor), vec![notifier as Arc<dyn Notifier>]);

    svc.occupy(1).await.unwrap();
    let session = svc.vacate(1).await.unwrap();
    assert_eq!(session.kind, SessionKind::Parking);
    assert!(session.total_amount >= 30.0);
    assert_eq!(svc.get_slot(1).await.unwrap().state, SlotState::Empty);

    let signals = drain(&mut signals).await;
    assert!(signals.contains(&Signal::TimerReset(slot(1))));
    assert!(signals.contains(&Signal::ReservationFlag(slot(1), false)));

    let notices = drain(&mut notices).await;
    assert!(notices
        .iter()
        .any(|(_, notice)| matches!(notice, Notice::Bill { .. })));

    let err = svc.vacate(1).await.unwrap_err();
    assert!(matches!(err, ParkError::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_pay_and_vacate_bills_the_payer() {
    let (notifier, mut notices) = RecordingNotifier::new();
    let svc = service(ledger().await, None, vec![notifier as Arc<dyn Notifier>]);

    assert!(matches!(
        svc.pay_and_vacate(2, driver()).await,
        Err(ParkError::PreconditionFailed(_))
    ));

    svc.occupy(2).await.unwrap();
    let payer = Occupant {
        vehicle_number: "MH12XY9999".to_string(),
        user_email: "payer@example.com".to_string(),
        user_phone: "+911234567890".to_string(),
    };
    let session = svc.pay_and_vacate(2, payer).await.unwrap();
    assert_eq!(session.vehicle_number.as_deref(), Some("MH12XY9999"));
    assert_eq!(session.payment_status, PaymentStatus::Pending);

    let notices = drain(&mut notices).await;
    assert!(notices.iter().any(|(contact, notice)| {
        matches!(notice, Notice::Bill { .. })
            && contact.email.as_deref() == Some("payer@example.com")
            && contact.phone.as_deref() == Some("+911234567890")
    }));
}

#[tokio::test]
async fn test_failing_notifiers_do_not_fail_operations() {
    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(FailingNotifier), Arc::new(HangingNotifier)];
    let svc = service(ledger().await, None, notifiers);

    let started = Instant::now();
    svc.reserve(request(1, 1.0)).await.unwrap();
    svc.cancel(1, "driver@example.com").await.unwrap();
    svc.occupy(2).await.unwrap();
    svc.vacate(2).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(svc.history(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_slots_expires_overdue_reservations() {
    let ledger = ledger().await;
    let svc = service(ledger.clone(), None, vec![]);

    let overdue = parkline_core::Reservation {
        arrival_deadline: Some(Utc::now() - ChronoDuration::minutes(1)),
        reserved_duration_hours: 2.0,
    };
    ledger.reserve(slot(1), &driver(), &overdue).await.unwrap();

    let slots = svc.list_slots().await.unwrap();
    assert_eq!(slots[0].state, SlotState::Empty);
    assert!(svc.history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_revenue_and_admin() {
    let svc = service(ledger().await, None, vec![]);

    svc.occupy(1).await.unwrap();
    let first = svc.vacate(1).await.unwrap();
    svc.occupy(1).await.unwrap();
    svc.vacate(1).await.unwrap();

    assert_eq!(svc.history(Some(1)).await.unwrap().len(), 1);
    assert_eq!(svc.pending_sessions().await.unwrap().len(), 2);

    svc.mark_paid(first.id).await.unwrap();
    svc.mark_paid(first.id).await.unwrap();
    let revenue = svc.revenue().await.unwrap();
    assert_eq!(revenue.count, 1);
    assert_eq!(revenue.total_amount, first.total_amount);
    assert_eq!(svc.pending_sessions().await.unwrap().len(), 1);

    assert!(matches!(svc.mark_paid(9999).await, Err(ParkError::NotFound(_))));

    svc.occupy(3).await.unwrap();
    svc.reset_all().await.unwrap();
    assert!(svc
        .list_slots()
        .await
        .unwrap()
        .iter()
        .all(|s| s.state == SlotState::Empty));

    assert_eq!(svc.clear_sessions().await.unwrap(), 2);
    assert!(svc.history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_after_deadline_releases_without_fee() {
    let ledger = ledger().await;
    let svc = service(ledger.clone(), None, vec![]);

    let lapsed = parkline_core::Reservation {
        arrival_deadline: Some(Utc::now() - ChronoDuration::minutes(2)),
        reserved_duration_hours: 3.0,
    };
    ledger.reserve(slot(2), &driver(), &lapsed).await.unwrap();

    let err = svc.cancel(2, "driver@example.com").await.unwrap_err();
    assert!(matches!(err, ParkError::PreconditionFailed(_)));
    assert_eq!(svc.get_slot(2).await.unwrap().state, SlotState::Empty);
    assert!(svc.history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_refuses_reservation_replaced_after_read() {
    let inner = ledger().await;
    inner.reserve(slot(1), &driver(), &reservation(2.0)).await.unwrap();

    let other = Occupant {
        vehicle_number: "MH12XY9999".to_string(),
        user_email: "other@example.com".to_string(),
        user_phone: "+911234567890".to_string(),
    };
    let racing = InterleavingLedger::new(
        inner.clone(),
        Interleaved::ReplaceReservation {
            slot_id: slot(1),
            holder_email: "driver@example.com".to_string(),
            occupant: other.clone(),
            reservation: reservation(3.0),
        },
    );
    let svc = service(racing, None, vec![]);

    let err = svc.cancel(1, "driver@example.com").await.unwrap_err();
    assert!(matches!(err, ParkError::PreconditionFailed(_)));

    // The newer booking is untouched and nobody was billed for it.
    let s = inner.get(slot(1)).await.unwrap();
    assert_eq!(s.status(), SlotStatus::Reserved);
    assert_eq!(s.state.occupant(), Some(&other));
    let fees: Vec<_> = inner
        .list_sessions(None, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|session| session.user_email.as_deref() == Some("other@example.com"))
        .collect();
    assert!(fees.is_empty());
}

#[tokio::test]
async fn test_send_receipt_resends_bill() {
    let (notifier, mut notices) = RecordingNotifier::new();
    let svc = service(ledger().await, None, vec![notifier as Arc<dyn Notifier>]);

    svc.occupy(2).await.unwrap();
    let payer = Occupant {
        vehicle_number: "MH12XY9999".to_string(),
        ..driver()
    };
    let session = svc.pay_and_vacate(2, payer).await.unwrap();
    drain(&mut notices).await;

    let sent = svc.send_receipt(session.id).await.unwrap();
    assert_eq!(sent, session);

    let notices = drain(&mut notices).await;
    assert_eq!(notices.len(), 1);
    let (contact, notice) = &notices[0];
    assert_eq!(contact.email.as_deref(), Some("driver@example.com"));
    assert!(matches!(notice, Notice::Bill { session: billed } if billed.id == session.id));

    assert!(matches!(svc.send_receipt(424242).await, Err(ParkError::NotFound(_))));
}

#[tokio::test]
async fn test_send_receipt_needs_a_contact() {
    let (notifier, mut notices) = RecordingNotifier::new();
    let svc = service(ledger().await, None, vec![notifier as Arc<dyn Notifier>]);

    svc.occupy(3).await.unwrap();
    let anonymous = svc.vacate(3).await.unwrap();
    drain(&mut notices).await;

    let err = svc.send_receipt(anonymous.id).await.unwrap_err();
    assert!(matches!(err, ParkError::PreconditionFailed(_)));
    assert!(drain(&mut notices).await.is_empty());
}
