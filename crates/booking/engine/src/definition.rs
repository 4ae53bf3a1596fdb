//! Workflow definitions: the static blueprint a run executes
//!
//! A definition binds a triggering event type to an ordered list of steps
//! and names the event types that cancel its in-flight runs.

use async_trait::async_trait;
use booking_types::{
    CorrelationKey, DefinitionId, EventType, RunId, SlotClock, StepHistory, WorkflowError,
    WorkflowResult,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

// ── Step Context ─────────────────────────────────────────────────────

/// What a step sees when it runs
#[derive(Debug)]
pub struct StepContext<'a> {
    pub run_id: &'a RunId,
    pub correlation_key: &'a CorrelationKey,
    pub payload: &'a Value,
    pub history: &'a StepHistory,
    pub now: DateTime<Utc>,
    pub slots: SlotClock,
}

// ── Actions ──────────────────────────────────────────────────────────

/// Errors an action step can fail with. Any of them fails the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("action timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Failed(String),
}

impl From<WorkflowError> for ActionError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::InvalidPayload(msg) => ActionError::InvalidPayload(msg),
            WorkflowError::Storage(msg) => ActionError::Storage(msg),
            other => ActionError::Failed(other.to_string()),
        }
    }
}

/// A side-effecting step. The returned value is memoised in the run's step
/// history and handed back on replay instead of re-invoking the action.
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, ActionError>;

    /// Batch actions that bound each unit of work themselves are exempt
    /// from the step-level action timeout.
    fn bounds_own_work(&self) -> bool {
        false
    }
}

/// How often an action is attempted before the run fails
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: std::time::Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: std::time::Duration::ZERO,
        }
    }

    pub fn attempts(max_attempts: u32, backoff: std::time::Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

// ── Steps ────────────────────────────────────────────────────────────

/// Computes an absolute wake time. `None` skips the sleep (and, by
/// convention, the branch that depends on it).
pub type WakeResolver = fn(&StepContext<'_>) -> WorkflowResult<Option<DateTime<Utc>>>;

/// Decides whether a triggering payload starts a run of this definition
pub type PayloadFilter = fn(&Value) -> bool;

/// One schedulable unit of a workflow
#[derive(Clone)]
pub enum StepSpec {
    Action {
        name: String,
        action: Arc<dyn Action>,
        retry: RetryPolicy,
    },
    SleepUntil {
        name: String,
        resolve: WakeResolver,
    },
    SleepFor {
        name: String,
        duration: Duration,
    },
}

impl StepSpec {
    pub fn action(name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        StepSpec::Action {
            name: name.into(),
            action,
            retry: RetryPolicy::none(),
        }
    }

    pub fn action_with_retry(
        name: impl Into<String>,
        action: Arc<dyn Action>,
        retry: RetryPolicy,
    ) -> Self {
        StepSpec::Action {
            name: name.into(),
            action,
            retry,
        }
    }

    pub fn sleep_until(name: impl Into<String>, resolve: WakeResolver) -> Self {
        StepSpec::SleepUntil {
            name: name.into(),
            resolve,
        }
    }

    pub fn sleep_for(name: impl Into<String>, duration: Duration) -> Self {
        StepSpec::SleepFor {
            name: name.into(),
            duration,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StepSpec::Action { name, .. }
            | StepSpec::SleepUntil { name, .. }
            | StepSpec::SleepFor { name, .. } => name,
        }
    }

    pub fn is_sleep(&self) -> bool {
        !matches!(self, StepSpec::Action { .. })
    }
}

impl std::fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepSpec::Action { name, retry, .. } => f
                .debug_struct("Action")
                .field("name", name)
                .field("retry", retry)
                .finish(),
            StepSpec::SleepUntil { name, .. } => {
                f.debug_struct("SleepUntil").field("name", name).finish()
            }
            StepSpec::SleepFor { name, duration } => f
                .debug_struct("SleepFor")
                .field("name", name)
                .field("duration", duration)
                .finish(),
        }
    }
}

// ── Workflow Definition ──────────────────────────────────────────────

/// A named workflow bound to a triggering event
#[derive(Clone, Debug)]
pub struct WorkflowDefinition {
    pub id: DefinitionId,
    pub description: String,
    pub trigger: EventType,
    pub steps: Vec<StepSpec>,
    pub cancel_triggers: Vec<EventType>,
    accepts: Option<PayloadFilter>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, trigger: EventType) -> Self {
        Self {
            id: DefinitionId::new(id),
            description: String::new(),
            trigger,
            steps: Vec::new(),
            cancel_triggers: Vec::new(),
            accepts: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn cancel_on(mut self, event_type: EventType) -> Self {
        if !self.cancel_triggers.contains(&event_type) {
            self.cancel_triggers.push(event_type);
        }
        self
    }

    /// Only start runs for payloads the filter accepts
    pub fn accepting(mut self, filter: PayloadFilter) -> Self {
        self.accepts = Some(filter);
        self
    }

    pub fn accepts(&self, payload: &Value) -> bool {
        self.accepts.map_or(true, |f| f(payload))
    }

    pub fn is_cancelled_by(&self, event_type: EventType) -> bool {
        self.cancel_triggers.contains(&event_type)
    }

    pub fn step_at(&self, index: usize) -> Option<&StepSpec> {
        self.steps.get(index)
    }

    pub fn validate(&self) -> WorkflowResult<()> {
        if self.id.as_str().is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "definition id must not be empty".into(),
            ));
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::InvalidDefinition(format!(
                "'{}' has no steps",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "'{}' declares step '{}' twice",
                    self.id,
                    step.name()
                )));
            }
        }

        if self.cancel_triggers.contains(&self.trigger) {
            return Err(WorkflowError::InvalidDefinition(format!(
                "'{}' cannot be cancelled by its own trigger {}",
                self.id, self.trigger
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Action for Noop {
        async fn execute(&self, _ctx: &StepContext<'_>) -> Result<Value, ActionError> {
            Ok(Value::Null)
        }
    }

    fn noop() -> Arc<dyn Action> {
        Arc::new(Noop)
    }

    #[test]
    fn test_valid_definition() {
        let def = WorkflowDefinition::new("redeemed", EventType::BookingRedeemed)
            .step(StepSpec::action("notify", noop()))
            .step(StepSpec::sleep_for("wait", Duration::days(1)))
            .cancel_on(EventType::BookingCanceled)
            .cancel_on(EventType::BookingCanceled);

        assert!(def.validate().is_ok());
        assert_eq!(def.cancel_triggers, vec![EventType::BookingCanceled]);
        assert!(def.is_cancelled_by(EventType::BookingCanceled));
        assert!(def.step_at(1).unwrap().is_sleep());
        assert!(def.step_at(2).is_none());
    }

    #[test]
    fn test_empty_definition_is_invalid() {
        let def = WorkflowDefinition::new("empty", EventType::BookingCreated);
        assert!(matches!(def.validate(), Err(WorkflowError::InvalidDefinition(_))));
    }

    #[test]
    fn test_duplicate_step_names_are_invalid() {
        let def = WorkflowDefinition::new("dup", EventType::BookingCreated)
            .step(StepSpec::action("notify", noop()))
            .step(StepSpec::action("notify", noop()));
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_self_cancelling_definition_is_invalid() {
        let def = WorkflowDefinition::new("loop", EventType::BookingCreated)
            .step(StepSpec::action("notify", noop()))
            .cancel_on(EventType::BookingCreated);
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_payload_filter() {
        let def = WorkflowDefinition::new("filtered", EventType::BookingApproved)
            .step(StepSpec::action("notify", noop()))
            .accepting(|p| p.get("wanted").is_some());

        assert!(def.accepts(&json!({"wanted": true})));
        assert!(!def.accepts(&json!({})));

        let open = WorkflowDefinition::new("open", EventType::BookingApproved);
        assert!(open.accepts(&json!({})));
    }

    #[test]
    fn test_retry_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::default().max_attempts, 1);
        assert_eq!(
            RetryPolicy::attempts(0, std::time::Duration::ZERO).max_attempts,
            1
        );
    }
}
