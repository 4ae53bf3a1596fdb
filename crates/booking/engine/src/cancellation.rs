//! Cancellation registry
//!
//! Maps `(event type, correlation key)` to the runs that event cancels. The
//! index is an accelerator rebuilt on recovery; every cancel also consults
//! storage by correlation key, so runs started by another instance are
//! found too.

use crate::clock::Clock;
use crate::definition_registry::DefinitionRegistry;
use crate::storage::{RunStore, WriteOutcome};
use crate::timer::DurableTimerService;
use booking_types::{CorrelationKey, EventType, RunId, RunStatus, WorkflowResult, WorkflowRun};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Bound on compare-and-swap retries while a run keeps changing underneath
const MAX_CANCEL_ATTEMPTS: usize = 8;

type CancelKey = (EventType, CorrelationKey);

pub struct CancellationRegistry {
    definitions: Arc<DefinitionRegistry>,
    runs: Arc<dyn RunStore>,
    timer: Arc<DurableTimerService>,
    clock: Arc<dyn Clock>,
    index: RwLock<HashMap<CancelKey, BTreeSet<RunId>>>,
}

impl CancellationRegistry {
    pub fn new(
        definitions: Arc<DefinitionRegistry>,
        runs: Arc<dyn RunStore>,
        timer: Arc<DurableTimerService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            definitions,
            runs,
            timer,
            clock,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Index a run under each of its definition's cancel triggers
    pub fn track(&self, run: &WorkflowRun) {
        let Ok(definition) = self.definitions.get(&run.definition_id) else {
            return;
        };
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        for trigger in &definition.cancel_triggers {
            index
                .entry((*trigger, run.correlation_key.clone()))
                .or_default()
                .insert(run.id.clone());
        }
    }

    pub fn untrack(&self, run_id: &RunId) {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index.retain(|_, ids| {
            ids.remove(run_id);
            !ids.is_empty()
        });
    }

    /// Replace the index with the given non-terminal runs
    pub fn rebuild(&self, runs: &[WorkflowRun]) {
        self.index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        for run in runs.iter().filter(|r| !r.is_terminal()) {
            self.track(run);
        }
    }

    pub fn tracked(&self, event_type: EventType, key: &CorrelationKey) -> Vec<RunId> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        index
            .get(&(event_type, key.clone()))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Cancel every in-flight run for `key` whose definition lists
    /// `event_type` as a cancel trigger. Returns the runs this call cancelled.
    pub async fn cancel(
        &self,
        event_type: EventType,
        key: &CorrelationKey,
    ) -> WorkflowResult<Vec<RunId>> {
        let mut candidates: BTreeSet<RunId> = self.tracked(event_type, key).into_iter().collect();
        for run in self.runs.list_runs_by_correlation(key).await? {
            if run.correlation_key == *key && self.is_cancelled_by(&run, event_type) {
                candidates.insert(run.id);
            }
        }

        let mut cancelled = Vec::new();
        for run_id in candidates {
            if self.cancel_run(&run_id, event_type, key).await? {
                cancelled.push(run_id);
            }
        }

        if !cancelled.is_empty() {
            tracing::info!(
                event = %event_type,
                correlation_key = %key,
                count = cancelled.len(),
                "Runs cancelled"
            );
        }
        Ok(cancelled)
    }

    fn is_cancelled_by(&self, run: &WorkflowRun, event_type: EventType) -> bool {
        self.definitions
            .get(&run.definition_id)
            .is_ok_and(|d| d.is_cancelled_by(event_type))
    }

    async fn cancel_run(
        &self,
        run_id: &RunId,
        event_type: EventType,
        key: &CorrelationKey,
    ) -> WorkflowResult<bool> {
        for _ in 0..MAX_CANCEL_ATTEMPTS {
            let Some(run) = self.runs.get_run(run_id).await? else {
                self.untrack(run_id);
                return Ok(false);
            };
            // The index is keyed by correlation key; never act across keys.
            if run.correlation_key != *key || !self.is_cancelled_by(&run, event_type) {
                return Ok(false);
            }
            if !run.status.is_cancellable() {
                self.untrack(run_id);
                return Ok(false);
            }

            let outcome = self
                .runs
                .transition_run(
                    run_id,
                    run.status,
                    RunStatus::Cancelled,
                    self.clock.now(),
                )
                .await?;

            match outcome {
                WriteOutcome::Applied => {
                    self.timer.unregister(run_id);
                    self.untrack(run_id);
                    tracing::debug!(
                        run_id = %run_id,
                        definition = %run.definition_id,
                        from = %run.status,
                        "Run cancelled"
                    );
                    return Ok(true);
                }
                WriteOutcome::Conflict { current } if current.is_cancellable() => {
                    tracing::debug!(run_id = %run_id, current = %current, "Cancel raced, retrying");
                }
                WriteOutcome::Conflict { .. } => {
                    self.untrack(run_id);
                    return Ok(false);
                }
            }
        }

        tracing::warn!(run_id = %run_id, "Cancel gave up after repeated conflicts");
        Ok(false)
    }
}

impl std::fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.index.read().map(|i| i.len()).unwrap_or_default();
        f.debug_struct("CancellationRegistry")
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}
