//! Booking orchestrator: the main entry point for the engine
//!
//! Composes the definition registry, dispatcher, scheduler, durable timer
//! service and cancellation registry over one run store and one clock.
//! The orchestrator:
//! 1. Publishes domain events (create runs, propagate cancellations)
//! 2. Drives runs to their next suspension
//! 3. Fires due timers and resumes sleepers
//! 4. Recovers in-flight runs after a restart

use crate::cancellation::CancellationRegistry;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::definition_registry::DefinitionRegistry;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::scheduler::{DriveOutcome, Scheduler};
use crate::storage::RunStore;
use crate::timer::DurableTimerService;
use booking_types::{
    CorrelationKey, DomainEvent, RunId, RunStatus, WorkflowError, WorkflowResult, WorkflowRun,
};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counts from a startup recovery pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub sleeping: usize,
    pub redriven: usize,
    pub tracked: usize,
}

pub struct BookingOrchestrator {
    definitions: Arc<DefinitionRegistry>,
    runs: Arc<dyn RunStore>,
    timer: Arc<DurableTimerService>,
    cancellation: Arc<CancellationRegistry>,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl BookingOrchestrator {
    pub fn new(
        definitions: DefinitionRegistry,
        runs: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let definitions = Arc::new(definitions);
        let timer = Arc::new(DurableTimerService::new(runs.clone()));
        let cancellation = Arc::new(CancellationRegistry::new(
            definitions.clone(),
            runs.clone(),
            timer.clone(),
            clock.clone(),
        ));
        let dispatcher = Dispatcher::new(
            definitions.clone(),
            runs.clone(),
            cancellation.clone(),
            clock.clone(),
        );
        let scheduler = Scheduler::new(
            definitions.clone(),
            runs.clone(),
            timer.clone(),
            clock.clone(),
            config.slot_clock(),
        )
        .with_action_timeout(config.action_timeout());

        Self {
            definitions,
            runs,
            timer,
            cancellation,
            dispatcher,
            scheduler,
            clock,
            poll_interval: config.timer_poll_interval(),
        }
    }

    pub fn definitions(&self) -> &DefinitionRegistry {
        &self.definitions
    }

    pub fn timer(&self) -> &DurableTimerService {
        &self.timer
    }

    pub fn cancellation(&self) -> &CancellationRegistry {
        &self.cancellation
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Create runs and propagate cancellations without driving anything
    pub async fn dispatch(&self, event: &DomainEvent) -> WorkflowResult<DispatchOutcome> {
        tracing::debug!(
            event = %event.event_type,
            correlation_key = %event.correlation_key,
            "Dispatching event"
        );
        self.dispatcher.dispatch(event).await
    }

    /// Dispatch an event and drive every run it started to its first
    /// suspension (or to the end).
    pub async fn publish(&self, event: &DomainEvent) -> WorkflowResult<DispatchOutcome> {
        let outcome = self.dispatch(event).await?;
        self.drive_all(&outcome.started).await;
        Ok(outcome)
    }

    /// Drive runs on the tokio runtime without waiting for them
    pub fn drive_in_background(self: &Arc<Self>, run_ids: Vec<RunId>) {
        if run_ids.is_empty() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive_all(&run_ids).await;
        });
    }

    // ── Runs ─────────────────────────────────────────────────────────

    pub async fn drive(&self, run_id: &RunId) -> WorkflowResult<DriveOutcome> {
        let outcome = self.scheduler.drive(run_id).await?;
        self.settle(run_id, &outcome);
        Ok(outcome)
    }

    async fn drive_all(&self, run_ids: &[RunId]) -> Vec<(RunId, DriveOutcome)> {
        let results = join_all(run_ids.iter().map(|id| self.drive(id))).await;

        run_ids
            .iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(outcome) => Some((id.clone(), outcome)),
                Err(e) => {
                    tracing::error!(run_id = %id, error = %e, "Drive failed");
                    None
                }
            })
            .collect()
    }

    pub async fn get_run(&self, run_id: &RunId) -> WorkflowResult<WorkflowRun> {
        self.runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.clone()))
    }

    pub async fn runs_for(&self, key: &CorrelationKey) -> WorkflowResult<Vec<WorkflowRun>> {
        Ok(self.runs.list_runs_by_correlation(key).await?)
    }

    /// Terminal runs no longer need to be found by cancel events
    fn settle(&self, run_id: &RunId, outcome: &DriveOutcome) {
        if outcome.is_terminal() {
            self.cancellation.untrack(run_id);
        }
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// Resume every run whose wake time has been reached
    pub async fn fire_due_timers(&self) -> Vec<(RunId, DriveOutcome)> {
        let due = self.timer.take_due(self.clock.now());
        if due.is_empty() {
            return Vec::new();
        }
        tracing::debug!(count = due.len(), "Firing due timers");

        let results = join_all(due.iter().map(|id| async move {
            let outcome = self.scheduler.resume(id).await?;
            self.settle(id, &outcome);
            Ok::<_, WorkflowError>(outcome)
        }))
        .await;
        due.into_iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(outcome) => Some((id, outcome)),
                Err(e) => {
                    tracing::error!(run_id = %id, error = %e, "Resume failed");
                    None
                }
            })
            .collect()
    }

    /// Rebuild in-memory state from storage after a restart: register every
    /// sleeper with the timer, rebuild the cancellation index, and re-drive
    /// runs that were pending or mid-step when the process stopped.
    pub async fn recover(&self) -> WorkflowResult<RecoveryReport> {
        let sleeping = self.timer.recover().await?;

        let live = self
            .runs
            .list_runs_by_status(&[RunStatus::Pending, RunStatus::Running, RunStatus::Sleeping])
            .await?;
        self.cancellation.rebuild(&live);

        let to_drive: Vec<RunId> = live
            .iter()
            .filter(|r| matches!(r.status, RunStatus::Pending | RunStatus::Running))
            .map(|r| r.id.clone())
            .collect();
        self.drive_all(&to_drive).await;

        let report = RecoveryReport {
            sleeping,
            redriven: to_drive.len(),
            tracked: live.len(),
        };
        tracing::info!(
            sleeping = report.sleeping,
            redriven = report.redriven,
            tracked = report.tracked,
            "Recovery complete"
        );
        Ok(report)
    }

    /// Timer loop: fire due wakes, sleep until the next wake (bounded by the
    /// poll interval), and re-scan storage on every poll so wakes persisted
    /// by other instances are picked up.
    pub async fn run_timers(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(poll_interval = ?self.poll_interval, "Timer loop started");
        let mut poll = tokio::time::interval(self.poll_interval);

        loop {
            self.fire_due_timers().await;

            let wait = self
                .timer
                .next_wake()
                .and_then(|t| (t - self.clock.now()).to_std().ok())
                .map_or(self.poll_interval, |d| d.min(self.poll_interval));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.timer.changed() => {}
                _ = poll.tick() => {
                    if let Err(e) = self.timer.recover().await {
                        tracing::warn!(error = %e, "Timer re-scan failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Timer loop stopping");
                        break;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for BookingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingOrchestrator")
            .field("definitions", &self.definitions.count())
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}
