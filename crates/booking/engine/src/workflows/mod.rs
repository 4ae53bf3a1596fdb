//! The booking workflows
//!
//! | id                        | trigger          | cancelled by                       |
//! |---------------------------|------------------|------------------------------------|
//! | `booking-created`         | booking.created  | approved, declined, canceled       |
//! | `booking-approved-slot`   | booking.approved | canceled                           |
//! | `booking-approved-anytime`| booking.approved | canceled                           |
//! | `booking-declined`        | booking.declined |                                    |
//! | `booking-canceled`        | booking.canceled |                                    |
//! | `booking-redeemed`        | booking.redeemed | canceled                           |
//! | `refresh-profiles`        | maintenance      |                                    |

pub mod approved;
pub mod canceled;
pub mod created;
pub mod declined;
pub mod maintenance;
pub mod notify;
pub mod redeemed;
pub mod reconciler;

use crate::definition::WorkflowDefinition;
use crate::definition_registry::DefinitionRegistry;
use crate::notification::NotificationGateway;
use crate::profile::ProfileDirectory;
use crate::storage::BookingStore;
use booking_types::{StepHistory, WorkflowResult};
use std::sync::Arc;

pub use maintenance::RefreshProfilesAction;
pub use notify::{NotificationPlan, NotifyAction};
pub use reconciler::ReconcileAction;

pub const BOOKING_CREATED: &str = "booking-created";
pub const BOOKING_APPROVED_SLOT: &str = "booking-approved-slot";
pub const BOOKING_APPROVED_ANYTIME: &str = "booking-approved-anytime";
pub const BOOKING_DECLINED: &str = "booking-declined";
pub const BOOKING_CANCELED: &str = "booking-canceled";
pub const BOOKING_REDEEMED: &str = "booking-redeemed";
pub const REFRESH_PROFILES: &str = "refresh-profiles";

/// Collaborators the concrete workflows act through
#[derive(Clone)]
pub struct WorkflowDeps {
    pub bookings: Arc<dyn BookingStore>,
    pub notifications: Arc<dyn NotificationGateway>,
    pub profiles: Arc<dyn ProfileDirectory>,
}

pub fn definitions(deps: &WorkflowDeps) -> Vec<WorkflowDefinition> {
    vec![
        created::definition(deps),
        approved::slot_definition(deps),
        approved::anytime_definition(deps),
        declined::definition(deps),
        canceled::definition(deps),
        redeemed::definition(deps),
        maintenance::definition(deps),
    ]
}

/// A registry holding every booking workflow
pub fn standard_registry(deps: &WorkflowDeps) -> WorkflowResult<DefinitionRegistry> {
    let mut registry = DefinitionRegistry::new();
    for definition in definitions(deps) {
        registry.register(definition)?;
    }
    Ok(registry)
}

/// True when the named sleep was skipped, which skips the branch after it
pub(crate) fn branch_skipped(history: &StepHistory, sleep_step: &str) -> bool {
    history
        .result(sleep_step)
        .and_then(|r| r.get("skipped"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// How late the named sleep woke relative to its planned wake time
pub(crate) fn sleep_lateness(history: &StepHistory, sleep_step: &str) -> Option<chrono::Duration> {
    let result = history.result(sleep_step)?;
    let instant = |field: &str| -> Option<chrono::DateTime<chrono::Utc>> {
        serde_json::from_value(result.get(field)?.clone()).ok()
    };
    Some(instant("wokeAt")? - instant("wakeAt")?)
}

pub(crate) fn skipped() -> serde_json::Value {
    serde_json::json!({ "skipped": true })
}
