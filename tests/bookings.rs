use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use roomcore::breaker::{BreakerConfig, BreakerRegistry, BreakerState};
use roomcore::directory::{Directory, RoomLookup, RoomRecord, RoomStatus, UserLookup, UserRecord};
use roomcore::engine::{Engine, EngineError, MemoryStore, Resolution};
use roomcore::existence::{ExistenceChecker, ExistenceProbe, ProbeError};
use roomcore::model::*;

// ── Test infrastructure ──────────────────────────────────────

/// Remote dependency double: scriptable up/down, shared across the test.
struct FlakyService {
    ids: Vec<u64>,
    up: std::sync::atomic::AtomicBool,
}

impl FlakyService {
    fn new(ids: Vec<u64>) -> Arc<Self> {
        Arc::new(Self {
            ids,
            up: std::sync::atomic::AtomicBool::new(true),
        })
    }

    fn set_up(&self, up: bool) {
        self.up.store(up, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl ExistenceProbe for FlakyService {
    async fn exists(&self, id: u64) -> Result<bool, ProbeError> {
        if self.up.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(self.ids.contains(&id))
        } else {
            Err(ProbeError::Transport("connection refused".into()))
        }
    }
}

struct Harness {
    engine: Arc<Engine>,
    breakers: Arc<BreakerRegistry>,
    users_service: Arc<FlakyService>,
    rooms_service: Arc<FlakyService>,
}

/// Full stack with doubles standing in for the remote users and rooms
/// services. The local directory replica knows user 1 and room 10 only.
fn harness(breaker: BreakerConfig) -> Harness {
    let breakers = Arc::new(BreakerRegistry::new());
    let directory = Arc::new(Directory::new());
    directory.insert_user(UserRecord {
        user_id: 1,
        username: "ada".into(),
    });
    directory.insert_room(RoomRecord {
        room_id: 10,
        name: "Boardroom".into(),
        status: RoomStatus::Available,
    });

    let users_service = FlakyService::new(vec![1, 2]);
    let rooms_service = FlakyService::new(vec![10, 20]);

    let users = ExistenceChecker::new(
        breakers.register("users", breaker),
        users_service.clone(),
        Arc::new(UserLookup(directory.clone())),
    );
    let rooms = ExistenceChecker::new(
        breakers.register("rooms", breaker),
        rooms_service.clone(),
        Arc::new(RoomLookup(directory)),
    );

    Harness {
        engine: Arc::new(Engine::new(Arc::new(MemoryStore::new()), users, rooms)),
        breakers,
        users_service,
        rooms_service,
    }
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

fn slot(s: NaiveTime, e: NaiveTime) -> TimeSlot {
    TimeSlot::new(s, e)
}

// ── Scenarios ────────────────────────────────────────────────

/// Two users race for one room and slot: one booking wins, the loser is
/// told who blocks, and cancelling the winner frees the slot.
#[tokio::test]
async fn contended_slot_lifecycle() {
    let h = harness(BreakerConfig::default());

    let won = h
        .engine
        .create(1, 10, d(1), slot(t(14, 0), t(15, 0)))
        .await
        .unwrap();
    let err = h
        .engine
        .create(2, 10, d(1), slot(t(14, 30), t(15, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(id) if id == won.id));

    h.engine.cancel(won.id, &Requester::member(1)).await.unwrap();
    let retry = h
        .engine
        .create(2, 10, d(1), slot(t(14, 30), t(15, 30)))
        .await
        .unwrap();
    assert_eq!(retry.status, BookingStatus::Confirmed);
}

/// The users service goes down mid-flight. Bookings keep working off the
/// local replica: the replicated user passes, the unreplicated one is
/// reported missing rather than erroring.
#[tokio::test]
async fn users_outage_degrades_to_local_replica() {
    let h = harness(BreakerConfig::default());
    h.users_service.set_up(false);

    let b = h
        .engine
        .create(1, 10, d(1), slot(t(9, 0), t(10, 0)))
        .await
        .unwrap();
    assert_eq!(b.user_id, 1);

    // User 2 exists remotely but was never replicated locally.
    let err = h
        .engine
        .create(2, 10, d(1), slot(t(10, 0), t(11, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UserNotFound(2)));
}

/// A persistent rooms outage trips that service's breaker. The users
/// breaker is untouched, and an operator reset re-arms the tripped one.
#[tokio::test]
async fn rooms_outage_trips_only_the_rooms_breaker() {
    let cfg = BreakerConfig {
        failure_threshold: 3,
        recovery_timeout: std::time::Duration::from_secs(60),
    };
    let h = harness(cfg);
    h.rooms_service.set_up(true);
    h.rooms_service.set_up(false);

    for i in 0..4u32 {
        // Room 20 is not replicated locally, so each attempt fails over
        // and reports the room missing.
        let err = h
            .engine
            .create(1, 20, d(1), slot(t(9, 0), t(10, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RoomNotFound(20)), "attempt {i}");
    }

    let rooms = h.breakers.status("rooms").unwrap();
    assert_eq!(rooms.state, BreakerState::Open);
    assert!(rooms.total_failures >= 3);
    let users = h.breakers.status("users").unwrap();
    assert_eq!(users.state, BreakerState::Closed);

    // Replicated room 10 still books while the breaker is open.
    h.engine
        .create(1, 10, d(1), slot(t(9, 0), t(10, 0)))
        .await
        .unwrap();

    assert!(h.breakers.reset("rooms"));
    assert_eq!(h.breakers.status("rooms").unwrap().state, BreakerState::Closed);
    h.rooms_service.set_up(true);
    h.engine
        .create(2, 20, d(1), slot(t(9, 0), t(10, 0)))
        .await
        .unwrap();
}

/// An elapsed confirmed booking shows up in the stuck sweep and is
/// finalized by an operator, after which the sweep is clean.
#[tokio::test]
async fn stuck_booking_is_reported_then_unblocked() {
    let h = harness(BreakerConfig::default());
    let b = h
        .engine
        .create(1, 10, d(1), slot(t(10, 0), t(11, 0)))
        .await
        .unwrap();

    let stuck = h.engine.find_stuck_at(d(2), t(9, 0)).await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, b.id);

    let done = h.engine.unblock(b.id, UnblockAction::Complete).await.unwrap();
    assert_eq!(done.status, BookingStatus::Completed);
    assert!(h.engine.find_stuck_at(d(2), t(9, 0)).await.unwrap().is_empty());
}

/// Operator conflict resolution end to end: inspect the blockers, cancel
/// one, override the other.
#[tokio::test]
async fn conflict_resolution_flow() {
    let h = harness(BreakerConfig::default());
    let a = h
        .engine
        .create(1, 10, d(1), slot(t(10, 0), t(11, 0)))
        .await
        .unwrap();
    let b = h
        .engine
        .create(2, 10, d(1), slot(t(11, 0), t(12, 0)))
        .await
        .unwrap();

    let blockers = h
        .engine
        .find_conflicts(10, d(1), &slot(t(10, 30), t(11, 30)))
        .await
        .unwrap();
    assert_eq!(blockers.iter().map(|x| x.id).collect::<Vec<_>>(), vec![a.id, b.id]);

    let res = h
        .engine
        .resolve_conflict(a.id, "cancel".parse().unwrap())
        .await
        .unwrap();
    assert!(matches!(res, Resolution::Cancelled(_)));
    let res = h
        .engine
        .resolve_conflict(b.id, "override".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(res, Resolution::Overridden(b.id));

    let blockers = h
        .engine
        .find_conflicts(10, d(1), &slot(t(10, 30), t(11, 30)))
        .await
        .unwrap();
    assert_eq!(blockers.iter().map(|x| x.id).collect::<Vec<_>>(), vec![b.id]);
}
