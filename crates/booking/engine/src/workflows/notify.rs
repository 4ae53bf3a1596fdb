//! Notification steps
//!
//! A notify step turns the booking payload into a list of notifications
//! and hands each to the gateway. Delivery failures are counted, never
//! fatal: a failed SMS must not block a later email or the final status
//! write.

use crate::definition::{Action, ActionError, StepContext};
use crate::notification::{Notification, NotificationGateway};
use crate::workflows::{branch_skipped, skipped, sleep_lateness};
use async_trait::async_trait;
use booking_types::{BookingPayload, Party};
use serde_json::{json, Value};
use std::sync::Arc;

/// Builds the notifications for one step from the booking payload
pub type NotificationPlan = fn(&BookingPayload) -> Vec<Notification>;

pub struct NotifyAction {
    gateway: Arc<dyn NotificationGateway>,
    plan: NotificationPlan,
    requires_elapsed: Option<&'static str>,
    grace: Option<chrono::Duration>,
}

impl NotifyAction {
    pub fn new(gateway: Arc<dyn NotificationGateway>, plan: NotificationPlan) -> Self {
        Self {
            gateway,
            plan,
            requires_elapsed: None,
            grace: None,
        }
    }

    /// Only send if the named sleep actually elapsed (was not skipped)
    pub fn after(mut self, sleep_step: &'static str) -> Self {
        self.requires_elapsed = Some(sleep_step);
        self
    }

    /// Drop the notification when the sleep woke more than `grace` past its
    /// planned time. Needs [`NotifyAction::after`].
    pub fn within(mut self, grace: chrono::Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    pub fn into_action(self) -> Arc<dyn Action> {
        Arc::new(self)
    }
}

#[async_trait]
impl Action for NotifyAction {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, ActionError> {
        if let Some(sleep) = self.requires_elapsed {
            if branch_skipped(ctx.history, sleep) {
                return Ok(skipped());
            }
            if let (Some(grace), Some(late)) = (self.grace, sleep_lateness(ctx.history, sleep)) {
                if late > grace {
                    tracing::info!(
                        run_id = %ctx.run_id,
                        after = sleep,
                        late_minutes = late.num_minutes(),
                        "Notification is stale, not sending"
                    );
                    return Ok(json!({ "skipped": true, "stale": true }));
                }
            }
        }

        let payload = BookingPayload::from_value(ctx.payload)?;
        let mut sent = 0u32;
        let mut failed = 0u32;

        for notification in (self.plan)(&payload) {
            match self.gateway.send(&notification).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        channel = notification.channel(),
                        template = notification.template(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        }

        Ok(json!({ "sent": sent, "failed": failed }))
    }
}

// ── Plan helpers ─────────────────────────────────────────────────────

/// Structured data every booking template receives
pub fn template_data(payload: &BookingPayload) -> Value {
    let booking = &payload.booking;
    json!({
        "bookingId": booking.id,
        "listingTitle": booking.listing.title,
        "businessName": booking.business.name,
        "creatorName": booking.user.name,
        "confirmedSlot": booking.confirmed_slot,
        "timeSlots": booking.time_slots,
    })
}

/// The business contact: the business account user, else the business
pub fn business_contact(payload: &BookingPayload) -> &Party {
    let user = &payload.business_user;
    if user.email.is_some() || user.phone.is_some() {
        user
    } else {
        &payload.booking.business
    }
}

pub fn creator_contact(payload: &BookingPayload) -> &Party {
    &payload.booking.user
}

pub fn email_to(party: &Party, subject: &str, template: &str, payload: &BookingPayload) -> Option<Notification> {
    party
        .email
        .as_ref()
        .map(|to| Notification::email(to.clone(), subject, template, template_data(payload)))
}

pub fn sms_to(party: &Party, template: &str, payload: &BookingPayload) -> Option<Notification> {
    party
        .phone
        .as_ref()
        .map(|to| Notification::sms(to.clone(), template, template_data(payload)))
}
