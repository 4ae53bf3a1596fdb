//! Crash-and-restart replay: a run interrupted at any write finishes with
//! the same step history as one that never crashed.

mod common;

use booking_engine::workflows::BOOKING_APPROVED_SLOT;
use booking_engine::{BookingOrchestrator, BookingStore, Clock, InMemoryStore, ManualClock};
use booking_types::{Booking, BookingStatus, CorrelationKey, RunStatus, StepRecord};
use common::*;
use std::sync::Arc;

const CONFIRMED: &str = "Monday, Jan 1, 2024 - 6:00 PM";

struct Outcome {
    history: Vec<StepRecord>,
    booking: BookingStatus,
    crashed: bool,
}

async fn run_with_crash_at(crash_at_write: usize) -> Outcome {
    let timeline = [
        at(2023, 12, 30, 12, 0),
        at(2024, 1, 1, 1, 0),
        at(2024, 1, 2, 0, 0),
        at(2024, 1, 2, 5, 0),
    ];

    let clock = Arc::new(ManualClock::new(timeline[0]));
    let inner = Arc::new(InMemoryStore::new());
    inner
        .put_booking(Booking::new("bk-1", BookingStatus::Approved))
        .await;
    let gateway = Arc::new(RecordingGateway::new(clock.clone()));
    let crashing = Arc::new(CrashingStore::new(inner.clone(), crash_at_write));

    let mut engine: Arc<BookingOrchestrator> =
        build_engine(crashing.clone(), inner.clone(), gateway.clone(), clock.clone());
    let mut restarted = false;

    for (i, t) in timeline.into_iter().enumerate() {
        clock.set(t);
        if i == 0 {
            engine
                .publish(&approved_event("bk-1", CONFIRMED, clock.now()))
                .await
                .unwrap();
        } else {
            engine.fire_due_timers().await;
        }

        if crashing.crashed() && !restarted {
            engine = build_engine(inner.clone(), inner.clone(), gateway.clone(), clock.clone());
            engine.recover().await.unwrap();
            engine.fire_due_timers().await;
            restarted = true;
        }
    }

    let run = engine
        .runs_for(&CorrelationKey::new("bk-1"))
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.definition_id.as_str() == BOOKING_APPROVED_SLOT)
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed, "crash at write {crash_at_write}");

    Outcome {
        history: run.step_history.iter().cloned().collect(),
        booking: inner.get_booking("bk-1").await.unwrap().unwrap().status,
        crashed: crashing.crashed(),
    }
}

#[tokio::test]
async fn crash_at_any_write_replays_to_identical_history() {
    let baseline = run_with_crash_at(usize::MAX).await;
    assert!(!baseline.crashed);
    assert_eq!(baseline.booking, BookingStatus::Completed);
    assert_eq!(baseline.history.len(), 7);

    // The approved workflow performs twelve run writes end to end.
    for k in 0..12 {
        let replayed = run_with_crash_at(k).await;
        assert!(replayed.crashed, "write {k} was never reached");
        assert_eq!(replayed.history, baseline.history, "crash at write {k}");
        assert_eq!(replayed.booking, BookingStatus::Completed);
    }
}
