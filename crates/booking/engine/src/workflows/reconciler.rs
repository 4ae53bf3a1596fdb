//! Booking status reconciler
//!
//! Applies a workflow's outcome to the booking as a conditional write. The
//! write only lands if the booking still has the status the workflow
//! expects, so a human action or another run that got there first wins and
//! the booking ends in exactly one terminal status. A booking already at
//! the target status counts as applied, which keeps a replayed step's result
//! identical to the first attempt's.

use crate::definition::{Action, ActionError, StepContext};
use crate::storage::{BookingStore, StorageError, WriteOutcome};
use crate::workflows::{branch_skipped, skipped};
use async_trait::async_trait;
use booking_types::BookingStatus;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ReconcileAction {
    bookings: Arc<dyn BookingStore>,
    expected: BookingStatus,
    target: BookingStatus,
    requires_elapsed: Option<&'static str>,
}

impl ReconcileAction {
    pub fn new(bookings: Arc<dyn BookingStore>, expected: BookingStatus, target: BookingStatus) -> Self {
        Self {
            bookings,
            expected,
            target,
            requires_elapsed: None,
        }
    }

    pub fn after(mut self, sleep_step: &'static str) -> Self {
        self.requires_elapsed = Some(sleep_step);
        self
    }

    pub fn into_action(self) -> Arc<dyn Action> {
        Arc::new(self)
    }
}

#[async_trait]
impl Action for ReconcileAction {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, ActionError> {
        if let Some(sleep) = self.requires_elapsed {
            if branch_skipped(ctx.history, sleep) {
                return Ok(skipped());
            }
        }

        let booking_id = ctx.correlation_key.as_str();
        let outcome = match self
            .bookings
            .update_booking_status(booking_id, self.expected, self.target)
            .await
        {
            Ok(outcome) => outcome,
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(booking_id, "Booking to reconcile no longer exists");
                return Ok(json!({ "applied": false, "missing": true }));
            }
            Err(e) => return Err(ActionError::Storage(e.to_string())),
        };

        match outcome {
            // A replay after a crash finds its own earlier write.
            WriteOutcome::Conflict { current } if current == self.target => {
                tracing::debug!(
                    run_id = %ctx.run_id,
                    booking_id,
                    status = %current,
                    "Booking already reconciled"
                );
                Ok(json!({ "applied": true, "status": self.target }))
            }
            WriteOutcome::Applied => {
                tracing::info!(
                    run_id = %ctx.run_id,
                    booking_id,
                    from = %self.expected,
                    to = %self.target,
                    "Booking status reconciled"
                );
                Ok(json!({ "applied": true, "status": self.target }))
            }
            WriteOutcome::Conflict { current } => {
                tracing::info!(
                    run_id = %ctx.run_id,
                    booking_id,
                    expected = %self.expected,
                    current = %current,
                    "Booking status changed elsewhere, write skipped"
                );
                Ok(json!({ "applied": false, "status": current }))
            }
        }
    }
}
