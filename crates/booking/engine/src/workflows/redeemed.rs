//! booking.redeemed: notify, wait a day, complete

use super::notify::{business_contact, creator_contact, email_to};
use super::{NotifyAction, ReconcileAction, WorkflowDeps, BOOKING_REDEEMED};
use crate::definition::{StepSpec, WorkflowDefinition};
use crate::notification::Notification;
use booking_types::{BookingPayload, BookingStatus, EventType};
use chrono::Duration;

pub const NOTIFY_REDEEMED: &str = "notify-redeemed";
pub const WAIT_ONE_DAY: &str = "wait-one-day";
pub const MARK_COMPLETED: &str = "mark-completed";

pub(super) fn definition(deps: &WorkflowDeps) -> WorkflowDefinition {
    WorkflowDefinition::new(BOOKING_REDEEMED, EventType::BookingRedeemed)
        .with_description("Complete a redeemed booking after a day")
        .step(StepSpec::action(
            NOTIFY_REDEEMED,
            NotifyAction::new(deps.notifications.clone(), redeemed).into_action(),
        ))
        .step(StepSpec::sleep_for(WAIT_ONE_DAY, Duration::days(1)))
        .step(StepSpec::action(
            MARK_COMPLETED,
            ReconcileAction::new(
                deps.bookings.clone(),
                BookingStatus::Approved,
                BookingStatus::Completed,
            )
            .into_action(),
        ))
        .cancel_on(EventType::BookingCanceled)
}

fn redeemed(p: &BookingPayload) -> Vec<Notification> {
    [
        email_to(creator_contact(p), "Booking redeemed", "booking-redeemed", p),
        email_to(business_contact(p), "Booking redeemed", "booking-redeemed", p),
    ]
    .into_iter()
    .flatten()
    .collect()
}
