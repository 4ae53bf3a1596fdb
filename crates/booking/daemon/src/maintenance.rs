//! Periodic maintenance trigger
//!
//! Publishes one maintenance event per interval; the `refresh-profiles`
//! workflow does the actual work.

use booking_engine::{BookingOrchestrator, Clock};
use booking_types::DomainEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Run the maintenance loop until shutdown is signalled
pub async fn run(
    orchestrator: Arc<BookingOrchestrator>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval = ?interval, "Maintenance loop started");

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; startup is not a maintenance slot.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                trigger(&orchestrator, clock.as_ref()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Maintenance loop stopping");
                    break;
                }
            }
        }
    }
}

/// Publish a single maintenance event
pub async fn trigger(orchestrator: &BookingOrchestrator, clock: &dyn Clock) {
    let event = DomainEvent::maintenance(clock.now());
    match orchestrator.publish(&event).await {
        Ok(outcome) => {
            tracing::debug!(started = outcome.started.len(), "Maintenance triggered");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Maintenance trigger failed");
        }
    }
}
