use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::broadcast;
use ulid::Ulid;

use slotbook::booking::{AppointmentStore, AvailabilityRepository, BookingCoordinator, BookingError};
use slotbook::config::BookingConfig;
use slotbook::model::*;
use slotbook::notify::NotifyHub;
use slotbook::store::{Catalog, LocalStore};

// ── Test infrastructure ──────────────────────────────────────

const CATALOG: &str = r#"{
    "services": [
        {"id": 1, "name": "Haircut", "duration_minutes": 30, "price_cents": 2500},
        {"id": 2, "name": "Beard trim", "price_cents": 0}
    ],
    "staff": [
        {"id": 10, "name": "Rui", "status": "active"},
        {"id": 11, "name": "Ines", "status": "active"}
    ],
    "staff_services": [
        {"staff_id": 10, "service_id": 1},
        {"staff_id": 11, "service_id": 1, "duration_minutes": 45},
        {"staff_id": 10, "service_id": 2}
    ],
    "schedules": [
        {"staff_id": 10, "day_of_week": 1, "hours": {"start": "09:00:00", "end": "12:00:00"},
         "breaks": [{"start": "10:00:00", "end": "10:30:00"}]},
        {"staff_id": 11, "day_of_week": 1, "hours": {"start": "09:00:00", "end": "11:00:00"}}
    ],
    "holidays": [
        {"date": "2026-12-25", "repeat_yearly": true},
        {"staff_id": 11, "start_date": "2026-03-09", "end_date": "2026-03-13"}
    ]
}"#;

fn test_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("slotbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_catalog(dir: &Path) -> PathBuf {
    let path = dir.join("catalog.json");
    std::fs::write(&path, CATALOG).unwrap();
    path
}

fn config() -> BookingConfig {
    let mut cfg = BookingConfig {
        slot_granularity_minutes: 15,
        default_service_duration_minutes: 20,
        ..BookingConfig::default()
    };
    cfg.policy.cancellation_cutoff_minutes = 120;
    cfg.policy.incomplete_hold_minutes = 15;
    cfg
}

struct Shop {
    store: Arc<LocalStore>,
    coordinator: BookingCoordinator<LocalStore, LocalStore>,
}

fn open_shop(dir: &Path, notify: Arc<NotifyHub>) -> Shop {
    let catalog = Catalog::load(&write_catalog(dir)).unwrap();
    let store = Arc::new(LocalStore::open_with_notify(&dir.join("slotbook.wal"), catalog, notify).unwrap());
    let coordinator = BookingCoordinator::new(store.clone(), store.clone(), config()).unwrap();
    Shop { store, coordinator }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(d: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    d.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
}

fn monday() -> NaiveDate {
    date(2026, 3, 2)
}

fn now() -> NaiveDateTime {
    at(date(2026, 2, 27), 18, 0)
}

fn customer(name: &str) -> CustomerInfo {
    CustomerInfo {
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        phone: Some("+351 900 000 000".into()),
        notes: None,
    }
}

/// Wait for an event with timeout.
async fn recv_event(rx: &mut broadcast::Receiver<Event>, timeout: Duration) -> Option<Event> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().and_then(|r| r.ok())
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn catalog_file_drives_slots() {
    let dir = test_dir();
    let shop = open_shop(&dir, Arc::new(NotifyHub::new()));
    let d = monday();

    let rui = shop.coordinator.generate_slots(1, Some(10), d, now()).await.unwrap();
    let starts: Vec<NaiveDateTime> = rui.iter().map(|s| s.start).collect();
    assert_eq!(
        starts,
        vec![
            at(d, 9, 0),
            at(d, 9, 15),
            at(d, 9, 30),
            at(d, 10, 30),
            at(d, 10, 45),
            at(d, 11, 0),
            at(d, 11, 15),
            at(d, 11, 30),
        ]
    );

    // 45-minute override for Ines
    let ines = shop.coordinator.generate_slots(1, Some(11), d, now()).await.unwrap();
    assert_eq!(ines.last().unwrap().start, at(d, 10, 15));

    // default duration applies to the service without one
    let beard = shop.coordinator.generate_slots(2, Some(10), d, now()).await.unwrap();
    assert_eq!(beard.iter().filter(|s| s.start < at(d, 10, 0)).count(), 3);

    // Ines is on holiday the next week
    let next = shop.coordinator.generate_slots(1, None, date(2026, 3, 9), now()).await.unwrap();
    assert!(next.iter().all(|s| s.staff == vec![10]));

    // yearly closure
    let xmas = date(2028, 12, 25);
    assert!(shop.store.is_holiday(None, xmas).await.unwrap());
}

#[tokio::test]
async fn paid_booking_lifecycle() {
    let dir = test_dir();
    let notify = Arc::new(NotifyHub::new());
    let mut rx = notify.subscribe(Some(10));
    let shop = open_shop(&dir, notify);
    let d = monday();

    let a = shop
        .coordinator
        .reserve_slot(1, Some(10), at(d, 9, 0), customer("Ana"), now())
        .await
        .unwrap();
    assert_eq!(a.status, AppointmentStatus::Incomplete);
    let created = recv_event(&mut rx, Duration::from_secs(5)).await.expect("expected event");
    assert_eq!(created, Event::AppointmentCreated { appointment: a.clone() });

    // events serialize for downstream consumers
    let payload = serde_json::to_value(&created).unwrap();
    assert!(payload.is_object());

    let payment = PaymentInfo {
        gateway: "stripe".into(),
        reference: "pi_3Nabc".into(),
    };
    let confirmed = shop
        .coordinator
        .confirm_reservation(a.id, Some(payment.clone()))
        .await
        .unwrap();
    assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
    match recv_event(&mut rx, Duration::from_secs(5)).await {
        Some(Event::StatusChanged { id, status, .. }) => {
            assert_eq!(id, a.id);
            assert_eq!(status, AppointmentStatus::Confirmed);
        }
        other => panic!("expected status change, got {other:?}"),
    }

    // duplicate gateway callback
    shop.coordinator.confirm_reservation(a.id, Some(payment)).await.unwrap();
    assert!(recv_event(&mut rx, Duration::from_millis(100)).await.is_none());

    // two hours before start is the last chance to cancel
    let late = at(d, 7, 30);
    assert!(matches!(
        shop.coordinator.cancel_by_token(&a.cancellation_token, late).await,
        Err(BookingError::TooLateToCancel(_))
    ));
    let cancelled = shop
        .coordinator
        .cancel_by_token(&a.cancellation_token, at(d, 7, 0))
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = test_dir();
    let (kept, dropped) = {
        let shop = open_shop(&dir, Arc::new(NotifyHub::new()));
        let d = monday();
        let kept = shop
            .coordinator
            .reserve_slot(2, Some(10), at(d, 11, 0), customer("Bea"), now())
            .await
            .unwrap();
        let dropped = shop
            .coordinator
            .reserve_slot(1, Some(10), at(d, 9, 0), customer("Caio"), now())
            .await
            .unwrap();
        shop.coordinator.release_hold(dropped.id).await.unwrap();
        shop.store.ledger.compact_wal().await.unwrap();
        (kept, dropped)
    };

    let shop = open_shop(&dir, Arc::new(NotifyHub::new()));
    assert_eq!(shop.store.get(kept.id).await.unwrap(), Some(kept.clone()));
    assert_eq!(
        shop.store.find_by_token(&dropped.cancellation_token).await.unwrap().map(|a| a.status),
        Some(AppointmentStatus::Cancelled)
    );

    let slots = shop.coordinator.generate_slots(2, Some(10), monday(), now()).await.unwrap();
    assert!(slots.iter().any(|s| s.start == at(monday(), 9, 0)));
    assert!(!slots.iter().any(|s| s.start == at(monday(), 11, 0)));
}

#[tokio::test]
async fn racing_customers_get_one_seat() {
    let dir = test_dir();
    let shop = Arc::new(open_shop(&dir, Arc::new(NotifyHub::new())));
    let start = at(monday(), 9, 0);

    let mut handles = Vec::new();
    for i in 0..50 {
        let shop = shop.clone();
        handles.push(tokio::spawn(async move {
            shop.coordinator
                .reserve_slot(1, None, start, customer(&format!("C{i}")), now())
                .await
        }));
    }
    let mut winners = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(a) => winners.push(a.staff_id),
            Err(e) => assert!(e.is_recoverable(), "unexpected error {e}"),
        }
    }
    // one seat per qualified staff member
    winners.sort();
    assert_eq!(winners, vec![Some(10), Some(11)]);
}

#[tokio::test]
async fn abandoned_checkouts_are_swept() {
    let dir = test_dir();
    let shop = open_shop(&dir, Arc::new(NotifyHub::new()));
    let d = monday();
    let mut holds = Vec::new();
    for h in [9, 11] {
        holds.push(
            shop.coordinator
                .reserve_slot(1, Some(10), at(d, h, 0), customer("Duda"), now())
                .await
                .unwrap(),
        );
    }
    let later = now() + chrono::Duration::minutes(15);
    assert_eq!(shop.coordinator.sweep_expired_holds(later).await.unwrap(), 2);
    assert_eq!(shop.coordinator.sweep_expired_holds(later).await.unwrap(), 0);
    for hold in holds {
        let a = shop.coordinator.appointment(hold.id).await.unwrap();
        assert_eq!(a.status, AppointmentStatus::Cancelled);
    }
    assert!(shop.store.incomplete_holds().await.unwrap().is_empty());
}
