//! Application state for API handlers

use booking_engine::{BookingOrchestrator, Clock};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,

    /// Stamps events that arrive without `emittedAt`
    pub clock: Arc<dyn Clock>,

    pub version: String,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<BookingOrchestrator>, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            orchestrator,
            clock,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
        }
    }

    /// Human-readable uptime
    pub fn uptime(&self) -> String {
        let secs = (self.clock.now() - self.started_at).num_seconds().max(0);
        let (days, rem) = (secs / 86_400, secs % 86_400);
        let (hours, rem) = (rem / 3_600, rem % 3_600);
        let (minutes, seconds) = (rem / 60, rem % 60);

        if days > 0 {
            format!("{}d {}h {}m", days, hours, minutes)
        } else if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    }
}
