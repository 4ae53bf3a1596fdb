//! Workflow runs: persisted executions of a workflow definition
//!
//! A run is a checkpointed state machine. Its cursor (`current_step_index`)
//! and step history are everything needed to resume it in another process.

use crate::{CorrelationKey, DefinitionId, RunId, WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ── Run Status ───────────────────────────────────────────────────────

/// Lifecycle status of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Sleeping,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed
        )
    }

    /// Statuses a cancel trigger can act on. A `Pending` run has not been
    /// picked up yet and is cancelled before its first step.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            RunStatus::Pending | RunStatus::Running | RunStatus::Sleeping
        )
    }

    /// Transitions only move toward a terminal status, except the
    /// Running/Sleeping cycle.
    pub fn can_transition_to(&self, to: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Sleeping)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
                | (Sleeping, Running)
                | (Sleeping, Cancelled)
                | (Sleeping, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Sleeping => "Sleeping",
            RunStatus::Completed => "Completed",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(RunStatus::Pending),
            "Running" => Some(RunStatus::Running),
            "Sleeping" => Some(RunStatus::Sleeping),
            "Completed" => Some(RunStatus::Completed),
            "Cancelled" => Some(RunStatus::Cancelled),
            "Failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Step History ─────────────────────────────────────────────────────

/// Memoised outcome of one completed step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: String,
    pub result: Value,
    pub completed_at: DateTime<Utc>,
}

/// Append-only, name-keyed step memo table.
///
/// Records live in an arena in completion order; lookups go through a
/// name index, so replay never depends on call order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<StepRecord>", into = "Vec<StepRecord>")]
pub struct StepHistory {
    records: Vec<StepRecord>,
    by_name: HashMap<String, usize>,
}

impl StepHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&StepRecord> {
        self.by_name.get(name).map(|&i| &self.records[i])
    }

    pub fn result(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|r| &r.result)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Append a record. Returns `false` (and keeps the first record) if the
    /// step name was already recorded.
    pub fn insert(&mut self, record: StepRecord) -> bool {
        if self.by_name.contains_key(&record.name) {
            return false;
        }
        self.by_name.insert(record.name.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }
}

impl PartialEq for StepHistory {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl From<Vec<StepRecord>> for StepHistory {
    fn from(records: Vec<StepRecord>) -> Self {
        let mut history = StepHistory::new();
        for record in records {
            history.insert(record);
        }
        history
    }
}

impl From<StepHistory> for Vec<StepRecord> {
    fn from(history: StepHistory) -> Self {
        history.records
    }
}

// ── Workflow Run ─────────────────────────────────────────────────────

/// One execution of a workflow definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: RunId,
    pub definition_id: DefinitionId,
    pub correlation_key: CorrelationKey,
    pub status: RunStatus,
    /// Index of the step being executed, or of the sleep being waited on
    pub current_step_index: usize,
    pub step_history: StepHistory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_at: Option<DateTime<Utc>>,
    pub payload: Value,
    /// Reason recorded when the run fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Create a new `Pending` run
    pub fn new(
        definition_id: DefinitionId,
        correlation_key: CorrelationKey,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunId::generate(),
            definition_id,
            correlation_key,
            status: RunStatus::Pending,
            current_step_index: 0,
            step_history: StepHistory::new(),
            wake_at: None,
            payload,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `to`, rejecting transitions that would leave a terminal
    /// status or skip the lifecycle.
    pub fn transition(&mut self, to: RunStatus, now: DateTime<Utc>) -> WorkflowResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(WorkflowError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to != RunStatus::Sleeping {
            self.wake_at = None;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Memoise a step result. Returns `false` if the step was already recorded.
    pub fn record_step(&mut self, name: &str, result: Value, now: DateTime<Utc>) -> bool {
        let inserted = self.step_history.insert(StepRecord {
            name: name.to_string(),
            result,
            completed_at: now,
        });
        self.updated_at = now;
        inserted
    }

    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.current_step_index += 1;
        self.updated_at = now;
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> WorkflowResult<()> {
        self.transition(RunStatus::Failed, now)?;
        self.error = Some(reason.into());
        Ok(())
    }
}
