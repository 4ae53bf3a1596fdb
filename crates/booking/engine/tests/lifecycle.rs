//! End-to-end booking lifecycle scenarios on a manual clock

mod common;

use booking_engine::workflows::{
    approved, created, BOOKING_APPROVED_ANYTIME, BOOKING_APPROVED_SLOT, BOOKING_CANCELED,
    BOOKING_CREATED, BOOKING_DECLINED, BOOKING_REDEEMED, REFRESH_PROFILES,
};
use booking_engine::{Clock, DriveOutcome};
use booking_types::{BookingStatus, DomainEvent, EventType, RunStatus};
use chrono::Duration;
use common::*;
use serde_json::json;

const SLOTS: [&str; 2] = ["Mon Jan 1, 2024 - 6:00 PM", "Tue Jan 2, 2024 - 7:00 PM"];
const CONFIRMED: &str = "Monday, Jan 1, 2024 - 6:00 PM";

#[tokio::test]
async fn created_booking_times_out_at_latest_slot() {
    let h = Harness::new(at(2023, 12, 31, 0, 0));
    h.seed_booking("bk-1", BookingStatus::Pending).await;

    let outcome = h
        .engine
        .publish(&created_event("bk-1", &SLOTS, h.clock.now()))
        .await
        .unwrap();
    assert_eq!(outcome.started.len(), 1);
    assert_eq!(h.gateway.with_template("booking-requested-business").len(), 1);
    assert_eq!(h.gateway.with_template("booking-requested-creator").len(), 1);

    // Latest slot is Jan 2, 7:00 PM, plus the fixed 7h offset.
    let deadline = at(2024, 1, 3, 2, 0);
    let run = h.run_of("bk-1", BOOKING_CREATED).await;
    assert_eq!(run.status, RunStatus::Sleeping);
    assert_eq!(run.wake_at, Some(deadline));

    h.advance_to(deadline - Duration::minutes(1)).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Pending);

    h.advance_to(deadline).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Unsuccessful);

    let run = h.run_of("bk-1", BOOKING_CREATED).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.step_history.result(created::MARK_UNSUCCESSFUL),
        Some(&json!({"applied": true, "status": "unsuccessful"}))
    );

    // A duplicate timer fire is a no-op.
    h.engine.timer().register(run.id.clone(), deadline);
    let fired = h.engine.fire_due_timers().await;
    assert_eq!(fired, vec![(run.id.clone(), DriveOutcome::Skipped)]);
    assert_eq!(h.run_of("bk-1", BOOKING_CREATED).await, run);
}

#[tokio::test]
async fn created_booking_without_slots_has_no_timeout() {
    let h = Harness::new(at(2023, 12, 31, 0, 0));
    h.seed_booking("bk-1", BookingStatus::Pending).await;

    h.engine
        .publish(&created_event("bk-1", &[], h.clock.now()))
        .await
        .unwrap();

    let run = h.run_of("bk-1", BOOKING_CREATED).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.step_history.result(created::WAIT_FOR_LATEST_SLOT),
        Some(&json!({"skipped": true}))
    );
    assert_eq!(
        run.step_history.result(created::MARK_UNSUCCESSFUL),
        Some(&json!({"skipped": true}))
    );
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Pending);
}

#[tokio::test]
async fn approved_booking_reminds_and_completes() {
    let h = Harness::new(at(2023, 12, 30, 12, 0));
    h.seed_booking("bk-1", BookingStatus::Approved).await;

    let outcome = h
        .engine
        .publish(&approved_event("bk-1", CONFIRMED, h.clock.now()))
        .await
        .unwrap();
    assert_eq!(outcome.started.len(), 1);
    assert_eq!(h.gateway.with_template("booking-approved-creator").len(), 1);
    assert_eq!(h.gateway.with_template("booking-approved-business").len(), 1);

    // Slot: Jan 1, 6:00 PM local, 2024-01-02T01:00Z.
    let slot = at(2024, 1, 2, 1, 0);
    let day_before = slot - Duration::hours(24);
    let hour_before = slot - Duration::hours(1);
    let after = slot + Duration::hours(4);

    h.advance_to(day_before - Duration::minutes(1)).await;
    assert!(h.gateway.with_template("booking-reminder-day").is_empty());

    h.advance_to(day_before).await;
    let reminders = h.gateway.with_template("booking-reminder-day");
    assert_eq!(reminders.len(), 2);
    assert!(reminders.iter().all(|s| s.at == day_before && s.channel == "email"));

    h.advance_to(hour_before).await;
    let texts = h.gateway.with_template("booking-reminder-hour");
    assert_eq!(texts.len(), 2);
    assert!(texts.iter().all(|s| s.at == hour_before && s.channel == "sms"));

    h.advance_to(after - Duration::minutes(1)).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Approved);

    h.advance_to(after).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Completed);

    let run = h.run_of("bk-1", BOOKING_APPROVED_SLOT).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.step_history.names(),
        vec![
            approved::SEND_CONFIRMATION,
            approved::SLEEP_UNTIL_DAY_BEFORE,
            approved::SEND_DAY_BEFORE_REMINDER,
            approved::SLEEP_UNTIL_HOUR_BEFORE,
            approved::SEND_HOUR_BEFORE_SMS,
            approved::SLEEP_UNTIL_AFTER_SLOT,
            approved::MARK_COMPLETED,
        ]
    );
    assert!(h.engine.timer().is_empty());
}

#[tokio::test]
async fn late_approval_drops_stale_reminders() {
    // Approved 30 minutes before the slot: the day-before reminder is 23.5h
    // late and dropped, the hour-before SMS is exactly within its grace.
    let slot = at(2024, 1, 2, 1, 0);
    let h = Harness::new(slot - Duration::minutes(30));
    h.seed_booking("bk-1", BookingStatus::Approved).await;

    h.engine
        .publish(&approved_event("bk-1", CONFIRMED, h.clock.now()))
        .await
        .unwrap();

    let run = h.run_of("bk-1", BOOKING_APPROVED_SLOT).await;
    assert_eq!(run.status, RunStatus::Sleeping);
    assert_eq!(run.wake_at, Some(slot + Duration::hours(4)));
    assert!(h.gateway.with_template("booking-reminder-day").is_empty());
    assert_eq!(h.gateway.with_template("booking-reminder-hour").len(), 2);
    assert_eq!(
        run.step_history.result(approved::SEND_DAY_BEFORE_REMINDER),
        Some(&json!({"skipped": true, "stale": true}))
    );

    h.advance_to(slot + Duration::hours(4)).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Completed);
}

#[tokio::test]
async fn approval_within_grace_still_reminds() {
    // Approved 20h before the slot: 4h past the day-before wake, inside the
    // 12h grace.
    let slot = at(2024, 1, 2, 1, 0);
    let h = Harness::new(slot - Duration::hours(20));
    h.seed_booking("bk-1", BookingStatus::Approved).await;

    h.engine
        .publish(&approved_event("bk-1", CONFIRMED, h.clock.now()))
        .await
        .unwrap();

    assert_eq!(h.gateway.with_template("booking-reminder-day").len(), 2);
    let run = h.run_of("bk-1", BOOKING_APPROVED_SLOT).await;
    assert_eq!(run.wake_at, Some(slot - Duration::hours(1)));
}

#[tokio::test]
async fn approved_anytime_booking_only_confirms() {
    let h = Harness::new(at(2024, 1, 1, 0, 0));
    h.seed_booking("bk-1", BookingStatus::Approved).await;

    let event = booking_event(EventType::BookingApproved, "bk-1", None, "anytime", h.clock.now());
    let outcome = h.engine.publish(&event).await.unwrap();
    assert_eq!(outcome.started.len(), 1);

    let run = h.run_of("bk-1", BOOKING_APPROVED_ANYTIME).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.step_history.len(), 1);
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Approved);
    assert!(h
        .engine
        .runs_for(&run.correlation_key)
        .await
        .unwrap()
        .iter()
        .all(|r| r.definition_id.as_str() != BOOKING_APPROVED_SLOT));
}

#[tokio::test]
async fn redeemed_booking_completes_a_day_later() {
    let start = at(2024, 1, 1, 0, 0);
    let h = Harness::new(start);
    h.seed_booking("bk-1", BookingStatus::Approved).await;

    let event = booking_event(EventType::BookingRedeemed, "bk-1", None, "anytime", start);
    h.engine.publish(&event).await.unwrap();
    assert_eq!(h.gateway.with_template("booking-redeemed").len(), 2);

    h.advance_to(start + Duration::hours(23)).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Approved);

    h.advance_to(start + Duration::days(1)).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Completed);
    assert_eq!(
        h.run_of("bk-1", BOOKING_REDEEMED).await.status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn declined_and_canceled_notify_parties() {
    let h = Harness::new(at(2024, 1, 1, 0, 0));

    let declined = booking_event(EventType::BookingDeclined, "bk-1", None, "timeSlot", h.clock.now());
    h.engine.publish(&declined).await.unwrap();
    let sent = h.gateway.with_template("booking-declined");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert_eq!(h.run_of("bk-1", BOOKING_DECLINED).await.status, RunStatus::Completed);

    h.engine
        .publish(&canceled_event("bk-2", h.clock.now()))
        .await
        .unwrap();
    let sent = h.gateway.with_template("booking-canceled");
    assert_eq!(sent.iter().filter(|s| s.channel == "email").count(), 2);
    assert_eq!(sent.iter().filter(|s| s.channel == "sms").count(), 2);
    assert_eq!(h.run_of("bk-2", BOOKING_CANCELED).await.status, RunStatus::Completed);
}

#[tokio::test]
async fn maintenance_trigger_runs_refresh() {
    let h = Harness::new(at(2024, 1, 1, 0, 0));
    let outcome = h
        .engine
        .publish(&DomainEvent::maintenance(h.clock.now()))
        .await
        .unwrap();
    assert_eq!(outcome.started.len(), 1);

    let run = h.run_of("maintenance", REFRESH_PROFILES).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.step_history.iter().next().map(|r| r.result.clone()),
        Some(json!({"refreshed": 0, "failed": 0}))
    );
}

#[tokio::test]
async fn sleeping_runs_survive_a_restart() {
    let mut h = Harness::new(at(2023, 12, 30, 12, 0));
    h.seed_booking("bk-1", BookingStatus::Approved).await;
    h.engine
        .publish(&approved_event("bk-1", CONFIRMED, h.clock.now()))
        .await
        .unwrap();

    h.restart();
    assert!(h.engine.timer().is_empty());

    let report = h.engine.recover().await.unwrap();
    assert_eq!(report.sleeping, 1);
    assert_eq!(report.redriven, 0);

    h.advance_to(at(2024, 1, 1, 1, 0)).await;
    assert_eq!(h.gateway.with_template("booking-reminder-day").len(), 2);
    h.advance_to(at(2024, 1, 2, 0, 0)).await;
    h.advance_to(at(2024, 1, 2, 5, 0)).await;
    assert_eq!(h.booking_status("bk-1").await, BookingStatus::Completed);
}

#[tokio::test]
async fn unparseable_slot_fails_the_run() {
    let h = Harness::new(at(2024, 1, 1, 0, 0));
    h.seed_booking("bk-1", BookingStatus::Approved).await;

    h.engine
        .publish(&approved_event("bk-1", "sometime next week", h.clock.now()))
        .await
        .unwrap();

    let run = h.run_of("bk-1", BOOKING_APPROVED_SLOT).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error
        .as_deref()
        .unwrap_or_default()
        .contains(approved::SLEEP_UNTIL_DAY_BEFORE));
    // The confirmation already went out and is not recalled.
    assert!(run.step_history.contains(approved::SEND_CONFIRMATION));
}
