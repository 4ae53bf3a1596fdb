//! booking.approved
//!
//! Slot-based listings get a confirmation, a reminder email the day
//! before, an SMS an hour before, and a completion write four hours after
//! the confirmed slot. Anytime listings only get the confirmation; their
//! completion follows booking.redeemed.

use super::notify::{business_contact, creator_contact, email_to, sms_to};
use super::{
    NotifyAction, ReconcileAction, WorkflowDeps, BOOKING_APPROVED_ANYTIME, BOOKING_APPROVED_SLOT,
};
use crate::definition::{StepContext, StepSpec, WorkflowDefinition};
use crate::notification::Notification;
use booking_types::{BookingPayload, BookingStatus, EventType, WorkflowResult};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

pub const SEND_CONFIRMATION: &str = "send-confirmation";
pub const SLEEP_UNTIL_DAY_BEFORE: &str = "sleep-until-day-before";
pub const SEND_DAY_BEFORE_REMINDER: &str = "send-day-before-reminder";
pub const SLEEP_UNTIL_HOUR_BEFORE: &str = "sleep-until-hour-before";
pub const SEND_HOUR_BEFORE_SMS: &str = "send-hour-before-sms";
pub const SLEEP_UNTIL_AFTER_SLOT: &str = "sleep-until-after-slot";
pub const MARK_COMPLETED: &str = "mark-completed";

const COMPLETE_AFTER_HOURS: i64 = 4;

/// A day-before reminder later than this no longer says "tomorrow"
const DAY_REMINDER_GRACE_HOURS: i64 = 12;
/// An hour-before SMS later than this arrives after the guest should leave
const HOUR_REMINDER_GRACE_MINUTES: i64 = 30;

pub(super) fn slot_definition(deps: &WorkflowDeps) -> WorkflowDefinition {
    WorkflowDefinition::new(BOOKING_APPROVED_SLOT, EventType::BookingApproved)
        .with_description("Confirm, remind before the slot, complete after it")
        .accepting(is_slot_based)
        .step(confirmation_step(deps))
        .step(StepSpec::sleep_until(SLEEP_UNTIL_DAY_BEFORE, day_before_slot))
        .step(StepSpec::action(
            SEND_DAY_BEFORE_REMINDER,
            NotifyAction::new(deps.notifications.clone(), day_before_reminders)
                .after(SLEEP_UNTIL_DAY_BEFORE)
                .within(Duration::hours(DAY_REMINDER_GRACE_HOURS))
                .into_action(),
        ))
        .step(StepSpec::sleep_until(SLEEP_UNTIL_HOUR_BEFORE, hour_before_slot))
        .step(StepSpec::action(
            SEND_HOUR_BEFORE_SMS,
            NotifyAction::new(deps.notifications.clone(), hour_before_sms)
                .after(SLEEP_UNTIL_HOUR_BEFORE)
                .within(Duration::minutes(HOUR_REMINDER_GRACE_MINUTES))
                .into_action(),
        ))
        .step(StepSpec::sleep_until(SLEEP_UNTIL_AFTER_SLOT, after_slot))
        .step(StepSpec::action(
            MARK_COMPLETED,
            ReconcileAction::new(
                deps.bookings.clone(),
                BookingStatus::Approved,
                BookingStatus::Completed,
            )
            .after(SLEEP_UNTIL_AFTER_SLOT)
            .into_action(),
        ))
        .cancel_on(EventType::BookingCanceled)
}

pub(super) fn anytime_definition(deps: &WorkflowDeps) -> WorkflowDefinition {
    WorkflowDefinition::new(BOOKING_APPROVED_ANYTIME, EventType::BookingApproved)
        .with_description("Confirm an anytime booking")
        .accepting(is_anytime)
        .step(confirmation_step(deps))
        .cancel_on(EventType::BookingCanceled)
}

fn confirmation_step(deps: &WorkflowDeps) -> StepSpec {
    StepSpec::action(
        SEND_CONFIRMATION,
        NotifyAction::new(deps.notifications.clone(), confirmations).into_action(),
    )
}

// Unparseable payloads go to the slot-based definition, whose first step
// then fails the run with the parse error.
fn is_slot_based(payload: &Value) -> bool {
    BookingPayload::from_value(payload).map_or(true, |p| p.booking.listing.requires_time_slot())
}

fn is_anytime(payload: &Value) -> bool {
    !is_slot_based(payload)
}

fn confirmed_slot(ctx: &StepContext<'_>) -> WorkflowResult<Option<DateTime<Utc>>> {
    let payload = BookingPayload::from_value(ctx.payload)?;
    match payload
        .booking
        .confirmed_slot
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        Some(slot) => ctx.slots.instant(slot).map(Some),
        None => Ok(None),
    }
}

fn day_before_slot(ctx: &StepContext<'_>) -> WorkflowResult<Option<DateTime<Utc>>> {
    Ok(confirmed_slot(ctx)?.map(|t| t - Duration::hours(24)))
}

fn hour_before_slot(ctx: &StepContext<'_>) -> WorkflowResult<Option<DateTime<Utc>>> {
    Ok(confirmed_slot(ctx)?.map(|t| t - Duration::hours(1)))
}

fn after_slot(ctx: &StepContext<'_>) -> WorkflowResult<Option<DateTime<Utc>>> {
    Ok(confirmed_slot(ctx)?.map(|t| t + Duration::hours(COMPLETE_AFTER_HOURS)))
}

fn confirmations(p: &BookingPayload) -> Vec<Notification> {
    [
        email_to(creator_contact(p), "Your booking is confirmed", "booking-approved-creator", p),
        email_to(business_contact(p), "Booking confirmed", "booking-approved-business", p),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn day_before_reminders(p: &BookingPayload) -> Vec<Notification> {
    [
        email_to(creator_contact(p), "Your booking is tomorrow", "booking-reminder-day", p),
        email_to(business_contact(p), "Booking tomorrow", "booking-reminder-day", p),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn hour_before_sms(p: &BookingPayload) -> Vec<Notification> {
    [
        sms_to(creator_contact(p), "booking-reminder-hour", p),
        sms_to(business_contact(p), "booking-reminder-hour", p),
    ]
    .into_iter()
    .flatten()
    .collect()
}
