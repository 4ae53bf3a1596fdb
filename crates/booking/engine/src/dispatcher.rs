//! Dispatcher: turns domain events into new runs and cancellation signals

use crate::cancellation::CancellationRegistry;
use crate::clock::Clock;
use crate::definition_registry::DefinitionRegistry;
use crate::storage::RunStore;
use booking_types::{DomainEvent, RunId, WorkflowResult, WorkflowRun};
use serde::Serialize;
use std::sync::Arc;

/// What a single event did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// Runs created (still `Pending`) for triggered definitions
    pub started: Vec<RunId>,
    /// In-flight runs moved to `Cancelled`
    pub cancelled: Vec<RunId>,
}

pub struct Dispatcher {
    definitions: Arc<DefinitionRegistry>,
    runs: Arc<dyn RunStore>,
    cancellation: Arc<CancellationRegistry>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        definitions: Arc<DefinitionRegistry>,
        runs: Arc<dyn RunStore>,
        cancellation: Arc<CancellationRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            definitions,
            runs,
            cancellation,
            clock,
        }
    }

    /// Create and persist a run for every definition triggered by the event
    /// that accepts its payload, then cancel in-flight runs of every other
    /// definition that lists the event type as a cancel trigger.
    ///
    /// Identical events are not deduplicated; each produces its own runs.
    pub async fn dispatch(&self, event: &DomainEvent) -> WorkflowResult<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();
        let key = event.run_correlation_key();

        for definition in self.definitions.triggered_by(event.event_type) {
            if !definition.accepts(&event.payload) {
                tracing::debug!(
                    definition = %definition.id,
                    event = %event.event_type,
                    "Payload not accepted by definition"
                );
                continue;
            }

            let run = WorkflowRun::new(
                definition.id.clone(),
                key.clone(),
                event.payload.clone(),
                self.clock.now(),
            );
            self.runs.insert_run(run.clone()).await?;
            self.cancellation.track(&run);

            tracing::info!(
                run_id = %run.id,
                definition = %definition.id,
                correlation_key = %key,
                "Run created"
            );
            outcome.started.push(run.id);
        }

        // Cancellation uses the same key new runs are filed under. A
        // definition is never cancelled by its own trigger, so this only
        // reaches runs of other definitions.
        if !self.definitions.cancellable_by(event.event_type).is_empty() {
            outcome.cancelled = self.cancellation.cancel(event.event_type, &key).await?;
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("definitions", &self.definitions.count())
            .finish_non_exhaustive()
    }
}
