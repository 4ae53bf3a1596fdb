//! booking.declined: tell the creator

use super::notify::{creator_contact, email_to};
use super::{NotifyAction, WorkflowDeps, BOOKING_DECLINED};
use crate::definition::{StepSpec, WorkflowDefinition};
use crate::notification::Notification;
use booking_types::{BookingPayload, EventType};

pub const NOTIFY_CREATOR: &str = "notify-creator";

pub(super) fn definition(deps: &WorkflowDeps) -> WorkflowDefinition {
    WorkflowDefinition::new(BOOKING_DECLINED, EventType::BookingDeclined)
        .with_description("Tell the creator the business declined")
        .step(StepSpec::action(
            NOTIFY_CREATOR,
            NotifyAction::new(deps.notifications.clone(), declined).into_action(),
        ))
}

fn declined(p: &BookingPayload) -> Vec<Notification> {
    email_to(creator_contact(p), "Your booking request was declined", "booking-declined", p)
        .into_iter()
        .collect()
}
