//! Durable timer service
//!
//! The durable half of a timer is the run record itself: a `Sleeping` run
//! with a `wake_at`, written by the scheduler before it registers here. This
//! service keeps an in-memory wheel of those wake times so the loop knows
//! what is due, and rebuilds the wheel from storage on start and on every
//! re-scan. Fires are at-least-once; resumption ignores runs that are no
//! longer sleeping.

use crate::storage::{RunStore, StorageResult};
use booking_types::{RunId, RunStatus};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct WakeRecord {
    wake_at: DateTime<Utc>,
    run_id: RunId,
}

#[derive(Debug, Default)]
struct Wheel {
    heap: BinaryHeap<Reverse<WakeRecord>>,
    planned: HashMap<RunId, DateTime<Utc>>,
}

impl Wheel {
    fn is_planned_at(&self, run_id: &RunId, wake_at: DateTime<Utc>) -> bool {
        self.planned.get(run_id).is_some_and(|t| *t == wake_at)
    }

    /// Drop heap entries superseded by a re-plan or an unregister
    fn clean_top(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_planned_at(&top.run_id, top.wake_at) {
                break;
            }
            self.heap.pop();
        }
    }

    fn plan(&mut self, run_id: RunId, wake_at: DateTime<Utc>) {
        self.planned.insert(run_id.clone(), wake_at);
        self.heap.push(Reverse(WakeRecord { wake_at, run_id }));
        self.clean_top();
    }

    fn unplan(&mut self, run_id: &RunId) -> bool {
        let removed = self.planned.remove(run_id).is_some();
        self.clean_top();
        removed
    }
}

pub struct DurableTimerService {
    runs: Arc<dyn RunStore>,
    wheel: Mutex<Wheel>,
    changed: Notify,
}

impl DurableTimerService {
    pub fn new(runs: Arc<dyn RunStore>) -> Self {
        Self {
            runs,
            wheel: Mutex::new(Wheel::default()),
            changed: Notify::new(),
        }
    }

    fn wheel(&self) -> std::sync::MutexGuard<'_, Wheel> {
        self.wheel.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule a wake for a run whose `Sleeping` state is already persisted.
    /// A later registration for the same run replaces the earlier one.
    pub fn register(&self, run_id: RunId, wake_at: DateTime<Utc>) {
        tracing::debug!(run_id = %run_id, wake_at = %wake_at, "Timer registered");
        self.wheel().plan(run_id, wake_at);
        self.changed.notify_one();
    }

    pub fn unregister(&self, run_id: &RunId) -> bool {
        self.wheel().unplan(run_id)
    }

    pub fn planned_at(&self, run_id: &RunId) -> Option<DateTime<Utc>> {
        self.wheel().planned.get(run_id).copied()
    }

    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.wheel().heap.peek().map(|Reverse(r)| r.wake_at)
    }

    pub fn len(&self) -> usize {
        self.wheel().planned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every run whose wake time is at or before `now`,
    /// earliest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<RunId> {
        let mut wheel = self.wheel();
        let mut due = Vec::new();

        while wheel.heap.peek().is_some_and(|Reverse(top)| top.wake_at <= now) {
            let Some(Reverse(record)) = wheel.heap.pop() else {
                break;
            };
            if wheel.is_planned_at(&record.run_id, record.wake_at) {
                wheel.planned.remove(&record.run_id);
                due.push(record.run_id);
            }
        }
        wheel.clean_top();
        due
    }

    /// Re-register every persisted `Sleeping` run. Called on start and
    /// periodically, so wakes persisted by another instance are picked up.
    pub async fn recover(&self) -> StorageResult<usize> {
        let sleeping = self.runs.list_runs_by_status(&[RunStatus::Sleeping]).await?;
        let mut count = 0;
        {
            let mut wheel = self.wheel();
            for run in sleeping {
                let wake_at = run.wake_at.unwrap_or(run.updated_at);
                if !wheel.is_planned_at(&run.id, wake_at) {
                    wheel.plan(run.id, wake_at);
                }
                count += 1;
            }
        }
        if count > 0 {
            self.changed.notify_one();
        }
        tracing::debug!(count, "Sleeping runs registered from storage");
        Ok(count)
    }

    /// Resolves when a registration may have moved the next wake earlier
    pub async fn changed(&self) {
        self.changed.notified().await
    }
}

impl std::fmt::Debug for DurableTimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTimerService")
            .field("planned", &self.len())
            .finish_non_exhaustive()
    }
}
