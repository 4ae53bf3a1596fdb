//! booking.canceled: email and text both parties

use super::notify::{business_contact, creator_contact, email_to, sms_to};
use super::{NotifyAction, WorkflowDeps, BOOKING_CANCELED};
use crate::definition::{StepSpec, WorkflowDefinition};
use crate::notification::Notification;
use booking_types::{BookingPayload, EventType};

pub const EMAIL_PARTIES: &str = "email-parties";
pub const SMS_PARTIES: &str = "sms-parties";

pub(super) fn definition(deps: &WorkflowDeps) -> WorkflowDefinition {
    WorkflowDefinition::new(BOOKING_CANCELED, EventType::BookingCanceled)
        .with_description("Tell both parties the booking was cancelled")
        .step(StepSpec::action(
            EMAIL_PARTIES,
            NotifyAction::new(deps.notifications.clone(), emails).into_action(),
        ))
        .step(StepSpec::action(
            SMS_PARTIES,
            NotifyAction::new(deps.notifications.clone(), texts).into_action(),
        ))
}

fn emails(p: &BookingPayload) -> Vec<Notification> {
    [
        email_to(creator_contact(p), "Your booking was cancelled", "booking-canceled", p),
        email_to(business_contact(p), "Booking cancelled", "booking-canceled", p),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn texts(p: &BookingPayload) -> Vec<Notification> {
    [
        sms_to(creator_contact(p), "booking-canceled", p),
        sms_to(business_contact(p), "booking-canceled", p),
    ]
    .into_iter()
    .flatten()
    .collect()
}
