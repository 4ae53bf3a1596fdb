//! booking.created: notify both parties, then time the request out at its
//! latest requested slot unless an approval, decline or cancel lands first.

use super::notify::{business_contact, creator_contact, email_to};
use super::{NotifyAction, ReconcileAction, WorkflowDeps, BOOKING_CREATED};
use crate::definition::{StepContext, StepSpec, WorkflowDefinition};
use crate::notification::Notification;
use booking_types::{BookingPayload, BookingStatus, EventType, WorkflowResult};
use chrono::{DateTime, Utc};

pub const NOTIFY_REQUESTED: &str = "notify-booking-requested";
pub const WAIT_FOR_LATEST_SLOT: &str = "wait-for-latest-slot";
pub const MARK_UNSUCCESSFUL: &str = "mark-unsuccessful";

pub(super) fn definition(deps: &WorkflowDeps) -> WorkflowDefinition {
    WorkflowDefinition::new(BOOKING_CREATED, EventType::BookingCreated)
        .with_description("Notify parties of a new request; expire it after the last requested slot")
        .step(StepSpec::action(
            NOTIFY_REQUESTED,
            NotifyAction::new(deps.notifications.clone(), requested_notifications).into_action(),
        ))
        .step(StepSpec::sleep_until(WAIT_FOR_LATEST_SLOT, latest_requested_slot))
        .step(StepSpec::action(
            MARK_UNSUCCESSFUL,
            ReconcileAction::new(
                deps.bookings.clone(),
                BookingStatus::Pending,
                BookingStatus::Unsuccessful,
            )
            .after(WAIT_FOR_LATEST_SLOT)
            .into_action(),
        ))
        .cancel_on(EventType::BookingApproved)
        .cancel_on(EventType::BookingDeclined)
        .cancel_on(EventType::BookingCanceled)
}

fn requested_notifications(p: &BookingPayload) -> Vec<Notification> {
    [
        email_to(business_contact(p), "New booking request", "booking-requested-business", p),
        email_to(creator_contact(p), "Your booking request was sent", "booking-requested-creator", p),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Slot-based listings time out at the latest requested slot. Anything
/// else (anytime listings, no slots) has no timeout.
fn latest_requested_slot(ctx: &StepContext<'_>) -> WorkflowResult<Option<DateTime<Utc>>> {
    let payload = BookingPayload::from_value(ctx.payload)?;
    if !payload.booking.listing.requires_time_slot() {
        return Ok(None);
    }
    ctx.slots.latest(&payload.booking.time_slots)
}
