use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use tablewait::config::{EngineConfig, SimulationConfig};
use tablewait::engine::{Engine, EngineError, TickApplied, WAIT_FLOOR_MINUTES};
use tablewait::model::*;
use tablewait::notify::NotifyHub;
use tablewait::policy::{RandomTickPolicy, ScriptedTickPolicy, TickOutcome, TickPolicy};
use tablewait::store::{DurableStore, MemoryStore, ReservationStore};

// ── Test infrastructure ──────────────────────────────────────

fn memory_engine(policy: Arc<dyn TickPolicy>) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(
        store.clone(),
        store.clone(),
        Arc::new(NotifyHub::new()),
        policy,
        EngineConfig::default(),
    );
    (engine, store)
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tablewait_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn bella_vista(guest_name: &str) -> JoinRequest {
    JoinRequest {
        restaurant_id: "1".into(),
        restaurant_name: "Bella Vista".into(),
        date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
        party_size: 2,
        preferred_times: vec!["7:00 PM".parse().unwrap(), "8:00 PM".parse().unwrap()],
        guest_name: guest_name.into(),
        guest_email: "ada@example.com".into(),
        guest_phone: String::new(),
    }
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn join_tick_until_offered_then_confirm() {
    let simulation = SimulationConfig {
        change_probability: 1.0,
        ..SimulationConfig::default()
    };
    let (engine, store) = memory_engine(Arc::new(RandomTickPolicy::seeded(&simulation, 2025)));

    let entry = engine.join(bella_vista("Ada")).await.unwrap();
    assert_eq!(entry.status, EntryStatus::Active);
    assert_eq!(entry.position, 1);

    let mut offered = None;
    for _ in 0..50 {
        match engine.tick_entry(entry.id).await.unwrap() {
            TickApplied::Promoted { available_time } => {
                offered = Some(available_time);
                break;
            }
            TickApplied::Skipped => panic!("active entry was skipped"),
            TickApplied::Held | TickApplied::Advanced { .. } => {
                let current = engine.get(entry.id).await.unwrap();
                assert!(current.position >= 1);
                assert!(current.estimated_wait_minutes >= WAIT_FLOOR_MINUTES);
            }
        }
    }
    let available_time = offered.expect("no promotion within 50 ticks");
    assert!(entry.preferred_times.contains(&available_time));

    let current = engine.get(entry.id).await.unwrap();
    assert_eq!(current.status, EntryStatus::Available);
    assert!(current.expires_at > current.notified_at);

    let reservation = engine.confirm(entry.id).await.unwrap();
    assert_eq!(reservation.time, available_time);
    assert_eq!(reservation.party_size, 2);
    assert_eq!(reservation.source, ReservationSource::Waitlist);
    assert_eq!(store.list_reservations().await.unwrap(), vec![reservation]);
    assert_eq!(engine.get(entry.id).await.unwrap().status, EntryStatus::Confirmed);
}

#[tokio::test]
async fn cancelled_entry_cannot_be_confirmed() {
    let (engine, store) = memory_engine(Arc::new(ScriptedTickPolicy::default()));

    let entry = engine.join(bella_vista("Ada")).await.unwrap();
    let cancelled = engine.cancel(entry.id).await.unwrap();
    assert_eq!(cancelled.status, EntryStatus::Cancelled);

    let err = engine.confirm(entry.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition { from: EntryStatus::Cancelled, .. }
    ));
    assert_eq!(store.reservation_count(), 0);
}

#[tokio::test]
async fn empty_guest_name_persists_nothing() {
    let (engine, store) = memory_engine(Arc::new(ScriptedTickPolicy::default()));

    let err = engine.join(bella_vista("")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(store.entry_count(), 0);
    assert!(engine.list(&EntryFilter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn join_from_front_end_payload() {
    let (engine, _store) = memory_engine(Arc::new(ScriptedTickPolicy::default()));

    let req: JoinRequest = serde_json::from_str(
        r#"{
            "restaurantId": "3",
            "restaurantName": "Le Petit Bistro",
            "date": "2025-06-20",
            "partySize": 4,
            "preferredTimes": ["6:30 PM", "7:30 PM"],
            "guestName": "Grace",
            "guestEmail": "grace@example.com"
        }"#,
    )
    .unwrap();
    let entry = engine.join(req).await.unwrap();

    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["status"], "active");
    assert_eq!(json["position"], 1);
    assert_eq!(json["estimatedWaitMinutes"], 15);
    assert_eq!(json["preferredTimes"], serde_json::json!(["6:30 PM", "7:30 PM"]));
    assert_eq!(json["guestPhone"], "");
}

#[tokio::test]
async fn declined_offer_never_returns_to_queue() {
    let policy = Arc::new(ScriptedTickPolicy::new([
        TickOutcome::Promote { slot: 0 },
        TickOutcome::Promote { slot: 0 },
    ]));
    let (engine, store) = memory_engine(policy);

    let entry = engine.join(bella_vista("Ada")).await.unwrap();
    engine.sweep().await;
    engine.decline(entry.id).await.unwrap();

    let report = engine.sweep().await;
    assert_eq!(report.ticked, 0);
    assert_eq!(engine.get(entry.id).await.unwrap().status, EntryStatus::Declined);
    assert!(engine.list(&EntryFilter::open()).await.unwrap().is_empty());
    assert_eq!(store.reservation_count(), 0);
}

#[tokio::test]
async fn durable_state_survives_restart() {
    let path = test_wal_path("waitlist.wal");

    let (confirmed_id, waiting_id, reservation) = {
        let store = Arc::new(DurableStore::open(&path).unwrap());
        let policy = Arc::new(ScriptedTickPolicy::new([TickOutcome::Promote { slot: 1 }]));
        let engine = Engine::new(
            store.clone(),
            store.clone(),
            Arc::new(NotifyHub::new()),
            policy,
            EngineConfig::default(),
        );

        let first = engine.join(bella_vista("Ada")).await.unwrap();
        let second = engine.join(bella_vista("Grace")).await.unwrap();
        engine.tick_entry(first.id).await.unwrap();
        let reservation = engine.confirm(first.id).await.unwrap();
        (first.id, second.id, reservation)
    };

    let store = Arc::new(DurableStore::open(&path).unwrap());
    let engine = Engine::new(
        store.clone(),
        store.clone(),
        Arc::new(NotifyHub::new()),
        Arc::new(ScriptedTickPolicy::default()),
        EngineConfig::default(),
    );

    let confirmed = engine.get(confirmed_id).await.unwrap();
    assert_eq!(confirmed.status, EntryStatus::Confirmed);
    assert_eq!(confirmed.available_time, Some("8:00 PM".parse().unwrap()));

    let waiting = engine.get(waiting_id).await.unwrap();
    assert_eq!(waiting.status, EntryStatus::Active);
    assert_eq!(waiting.position, 2);

    assert_eq!(
        store.get_reservation(reservation.id).await.unwrap(),
        Some(reservation)
    );
}
