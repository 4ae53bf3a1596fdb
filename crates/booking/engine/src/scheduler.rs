//! Scheduler / step executor
//!
//! Drives a run through its steps from the persisted cursor. Every write is
//! a compare-and-swap against `Running`, and the run is reloaded at each
//! step boundary, so a cancellation landing between steps stops the run
//! before the next one starts. Memoised steps are never executed twice.

use crate::clock::Clock;
use crate::definition::{Action, ActionError, RetryPolicy, StepContext, StepSpec};
use crate::definition_registry::DefinitionRegistry;
use crate::storage::{RunStore, WriteOutcome};
use crate::timer::DurableTimerService;
use booking_types::{RunId, RunStatus, SlotClock, WorkflowError, WorkflowResult, WorkflowRun};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Where a drive call left the run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriveOutcome {
    /// Suspended until the given instant
    Sleeping(DateTime<Utc>),
    Completed,
    Cancelled,
    Failed(String),
    /// Nothing to do: the run was not in a drivable state
    Skipped,
}

impl DriveOutcome {
    /// The run reached a terminal status during this drive
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DriveOutcome::Completed | DriveOutcome::Cancelled | DriveOutcome::Failed(_)
        )
    }

    fn after_conflict(current: RunStatus) -> Self {
        match current {
            RunStatus::Cancelled => DriveOutcome::Cancelled,
            _ => DriveOutcome::Skipped,
        }
    }
}

pub struct Scheduler {
    definitions: Arc<DefinitionRegistry>,
    runs: Arc<dyn RunStore>,
    timer: Arc<DurableTimerService>,
    clock: Arc<dyn Clock>,
    slots: SlotClock,
    action_timeout: Option<Duration>,
}

impl Scheduler {
    pub fn new(
        definitions: Arc<DefinitionRegistry>,
        runs: Arc<dyn RunStore>,
        timer: Arc<DurableTimerService>,
        clock: Arc<dyn Clock>,
        slots: SlotClock,
    ) -> Self {
        Self {
            definitions,
            runs,
            timer,
            clock,
            slots,
            action_timeout: None,
        }
    }

    pub fn with_action_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.action_timeout = timeout;
        self
    }

    async fn load(&self, run_id: &RunId) -> WorkflowResult<WorkflowRun> {
        self.runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.clone()))
    }

    /// Drive a run from whatever state it is persisted in: start a pending
    /// run, continue a running one (crash recovery), or resume a sleeper.
    pub async fn drive(&self, run_id: &RunId) -> WorkflowResult<DriveOutcome> {
        let run = self.load(run_id).await?;
        match run.status {
            RunStatus::Pending => self.start(run_id).await,
            RunStatus::Running => self.execute(run_id).await,
            RunStatus::Sleeping => self.resume(run_id).await,
            _ => Ok(DriveOutcome::Skipped),
        }
    }

    /// Take a pending run and execute it up to its first suspension
    pub async fn start(&self, run_id: &RunId) -> WorkflowResult<DriveOutcome> {
        let outcome = self
            .runs
            .transition_run(run_id, RunStatus::Pending, RunStatus::Running, self.clock.now())
            .await?;
        if let WriteOutcome::Conflict { current } = outcome {
            tracing::debug!(run_id = %run_id, current = %current, "Run not pending, start skipped");
            return Ok(DriveOutcome::after_conflict(current));
        }

        tracing::info!(run_id = %run_id, "Run started");
        self.execute(run_id).await
    }

    /// Handle a timer fire. A no-op unless the run is still sleeping, which
    /// makes duplicate and late fires harmless.
    pub async fn resume(&self, run_id: &RunId) -> WorkflowResult<DriveOutcome> {
        let mut run = self.load(run_id).await?;
        if run.status != RunStatus::Sleeping {
            tracing::debug!(run_id = %run_id, status = %run.status, "Wake ignored");
            return Ok(DriveOutcome::Skipped);
        }

        let now = self.clock.now();
        let wake_at = run.wake_at.unwrap_or(now);
        if wake_at > now {
            // Early fire; put the wake back.
            self.timer.register(run.id.clone(), wake_at);
            return Ok(DriveOutcome::Sleeping(wake_at));
        }

        if let Some(step) = self
            .definitions
            .get(&run.definition_id)?
            .step_at(run.current_step_index)
        {
            run.record_step(step.name(), elapsed_sleep(wake_at, now), now);
        }
        run.advance(now);
        run.transition(RunStatus::Running, now)?;

        match self.runs.update_run(&run, RunStatus::Sleeping).await? {
            WriteOutcome::Applied => {
                tracing::info!(
                    run_id = %run.id,
                    definition = %run.definition_id,
                    "Run resumed"
                );
                self.execute(run_id).await
            }
            WriteOutcome::Conflict { current } => Ok(DriveOutcome::after_conflict(current)),
        }
    }

    /// Execute steps of a `Running` run until it sleeps or ends
    pub async fn execute(&self, run_id: &RunId) -> WorkflowResult<DriveOutcome> {
        loop {
            let mut run = self.load(run_id).await?;
            match run.status {
                RunStatus::Running => {}
                RunStatus::Cancelled => return Ok(DriveOutcome::Cancelled),
                _ => return Ok(DriveOutcome::Skipped),
            }

            let definition = match self.definitions.get(&run.definition_id) {
                Ok(d) => d,
                Err(e) => return self.fail(run, e.to_string()).await,
            };
            let now = self.clock.now();

            let Some(step) = definition.step_at(run.current_step_index) else {
                run.transition(RunStatus::Completed, now)?;
                return match self.runs.update_run(&run, RunStatus::Running).await? {
                    WriteOutcome::Applied => {
                        tracing::info!(
                            run_id = %run.id,
                            definition = %run.definition_id,
                            steps = run.step_history.len(),
                            "Run completed"
                        );
                        Ok(DriveOutcome::Completed)
                    }
                    WriteOutcome::Conflict { current } => Ok(DriveOutcome::after_conflict(current)),
                };
            };

            if run.step_history.contains(step.name()) {
                tracing::debug!(run_id = %run.id, step = step.name(), "Step replayed from history");
                run.advance(now);
                if let WriteOutcome::Conflict { current } =
                    self.runs.update_run(&run, RunStatus::Running).await?
                {
                    return Ok(DriveOutcome::after_conflict(current));
                }
                continue;
            }

            let step_name = step.name().to_string();
            match step {
                StepSpec::Action { action, retry, .. } => {
                    let result = {
                        let ctx = self.context(&run, now);
                        self.run_action(action.as_ref(), *retry, &ctx, &step_name)
                            .await
                    };
                    match result {
                        Ok(value) => {
                            let done = self.clock.now();
                            run.record_step(&step_name, value, done);
                            run.advance(done);
                            if let WriteOutcome::Conflict { current } =
                                self.runs.update_run(&run, RunStatus::Running).await?
                            {
                                return Ok(DriveOutcome::after_conflict(current));
                            }
                            tracing::debug!(run_id = %run.id, step = %step_name, "Step completed");
                        }
                        Err(e) => {
                            tracing::error!(
                                run_id = %run.id,
                                definition = %run.definition_id,
                                step = %step_name,
                                error = %e,
                                "Action failed"
                            );
                            return self.fail(run, format!("step '{}': {}", step_name, e)).await;
                        }
                    }
                }
                StepSpec::SleepUntil { resolve, .. } => {
                    let resolved = {
                        let ctx = self.context(&run, now);
                        resolve(&ctx)
                    };
                    match resolved {
                        Ok(Some(wake_at)) => {
                            if let Some(outcome) = self.sleep(&mut run, &step_name, wake_at, now).await? {
                                return Ok(outcome);
                            }
                        }
                        Ok(None) => {
                            tracing::debug!(run_id = %run.id, step = %step_name, "Sleep skipped");
                            run.record_step(&step_name, json!({ "skipped": true }), now);
                            run.advance(now);
                            if let WriteOutcome::Conflict { current } =
                                self.runs.update_run(&run, RunStatus::Running).await?
                            {
                                return Ok(DriveOutcome::after_conflict(current));
                            }
                        }
                        Err(e) => {
                            return self.fail(run, format!("step '{}': {}", step_name, e)).await;
                        }
                    }
                }
                StepSpec::SleepFor { duration, .. } => {
                    let wake_at = now + *duration;
                    if let Some(outcome) = self.sleep(&mut run, &step_name, wake_at, now).await? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    fn context<'a>(&self, run: &'a WorkflowRun, now: DateTime<Utc>) -> StepContext<'a> {
        StepContext {
            run_id: &run.id,
            correlation_key: &run.correlation_key,
            payload: &run.payload,
            history: &run.step_history,
            now,
            slots: self.slots,
        }
    }

    /// Suspend the run, or pass straight through a wake time already reached.
    /// Returns `Some` when the drive call should stop.
    async fn sleep(
        &self,
        run: &mut WorkflowRun,
        step_name: &str,
        wake_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Option<DriveOutcome>> {
        if wake_at <= now {
            run.record_step(step_name, elapsed_sleep(wake_at, now), now);
            run.advance(now);
            return match self.runs.update_run(run, RunStatus::Running).await? {
                WriteOutcome::Applied => Ok(None),
                WriteOutcome::Conflict { current } => Ok(Some(DriveOutcome::after_conflict(current))),
            };
        }

        run.transition(RunStatus::Sleeping, now)?;
        run.wake_at = Some(wake_at);
        match self.runs.update_run(run, RunStatus::Running).await? {
            WriteOutcome::Applied => {
                self.timer.register(run.id.clone(), wake_at);
                tracing::info!(
                    run_id = %run.id,
                    definition = %run.definition_id,
                    step = step_name,
                    wake_at = %wake_at,
                    "Run sleeping"
                );
                Ok(Some(DriveOutcome::Sleeping(wake_at)))
            }
            WriteOutcome::Conflict { current } => Ok(Some(DriveOutcome::after_conflict(current))),
        }
    }

    async fn run_action(
        &self,
        action: &dyn Action,
        retry: RetryPolicy,
        ctx: &StepContext<'_>,
        step_name: &str,
    ) -> Result<Value, ActionError> {
        let timeout = self.action_timeout.filter(|_| !action.bounds_own_work());
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, action.execute(ctx))
                    .await
                    .unwrap_or(Err(ActionError::Timeout(limit))),
                None => action.execute(ctx).await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < retry.max_attempts => {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        step = step_name,
                        attempt,
                        error = %e,
                        "Action attempt failed, retrying"
                    );
                    if !retry.backoff.is_zero() {
                        tokio::time::sleep(retry.backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fail(&self, mut run: WorkflowRun, reason: String) -> WorkflowResult<DriveOutcome> {
        run.fail(reason.clone(), self.clock.now())?;
        match self.runs.update_run(&run, RunStatus::Running).await? {
            WriteOutcome::Applied => {
                tracing::warn!(run_id = %run.id, reason = %reason, "Run failed");
                Ok(DriveOutcome::Failed(reason))
            }
            WriteOutcome::Conflict { current } => Ok(DriveOutcome::after_conflict(current)),
        }
    }
}

fn elapsed_sleep(wake_at: DateTime<Utc>, now: DateTime<Utc>) -> Value {
    json!({ "wakeAt": wake_at, "wokeAt": now })
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("slots", &self.slots)
            .field("action_timeout", &self.action_timeout)
            .finish_non_exhaustive()
    }
}
