//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly. It survives nothing: production
//! deployments use a transactional backend so sleeping runs outlive the
//! process.

use crate::storage::traits::{BookingStore, RunStore, WriteOutcome};
use crate::storage::{StorageError, StorageResult};
use async_trait::async_trait;
use booking_types::{Booking, BookingStatus, CorrelationKey, RunId, RunStatus, WorkflowRun};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory run and booking storage
#[derive(Debug, Default)]
pub struct InMemoryStore {
    runs: Arc<RwLock<HashMap<RunId, WorkflowRun>>>,
    bookings: Arc<RwLock<HashMap<String, Booking>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a booking (the marketplace owns bookings; this
    /// stands in for its CRUD layer).
    pub async fn put_booking(&self, booking: Booking) {
        let mut bookings = self.bookings.write().await;
        bookings.insert(booking.id.clone(), booking);
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }
}

fn sorted_oldest_first(mut runs: Vec<WorkflowRun>) -> Vec<WorkflowRun> {
    runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    runs
}

#[async_trait]
impl RunStore for InMemoryStore {
    async fn insert_run(&self, run: WorkflowRun) -> StorageResult<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(StorageError::Conflict(format!("run {} already exists", run.id)));
        }
        runs.insert(run.id.clone(), run);
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> StorageResult<Option<WorkflowRun>> {
        let runs = self.runs.read().await;
        Ok(runs.get(id).cloned())
    }

    async fn update_run(
        &self,
        run: &WorkflowRun,
        expected: RunStatus,
    ) -> StorageResult<WriteOutcome<RunStatus>> {
        let mut runs = self.runs.write().await;
        let stored = runs
            .get_mut(&run.id)
            .ok_or_else(|| StorageError::NotFound(format!("run {} not found", run.id)))?;

        if stored.status != expected {
            return Ok(WriteOutcome::Conflict {
                current: stored.status,
            });
        }
        if run.status != expected && !expected.can_transition_to(run.status) {
            return Err(StorageError::InvariantViolation(format!(
                "invalid run transition: {} -> {}",
                expected, run.status
            )));
        }

        *stored = run.clone();
        Ok(WriteOutcome::Applied)
    }

    async fn transition_run(
        &self,
        id: &RunId,
        expected: RunStatus,
        to: RunStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<WriteOutcome<RunStatus>> {
        let mut runs = self.runs.write().await;
        let stored = runs
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("run {} not found", id)))?;

        if stored.status != expected {
            return Ok(WriteOutcome::Conflict {
                current: stored.status,
            });
        }

        stored.transition(to, at).map_err(|e| StorageError::InvariantViolation(e.to_string()))?;
        Ok(WriteOutcome::Applied)
    }

    async fn list_runs_by_status(&self, statuses: &[RunStatus]) -> StorageResult<Vec<WorkflowRun>> {
        let runs = self.runs.read().await;
        Ok(sorted_oldest_first(
            runs.values()
                .filter(|r| statuses.contains(&r.status))
                .cloned()
                .collect(),
        ))
    }

    async fn list_runs_by_correlation(
        &self,
        key: &CorrelationKey,
    ) -> StorageResult<Vec<WorkflowRun>> {
        let runs = self.runs.read().await;
        Ok(sorted_oldest_first(
            runs.values()
                .filter(|r| &r.correlation_key == key)
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn get_booking(&self, id: &str) -> StorageResult<Option<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(id).cloned())
    }

    async fn update_booking_status(
        &self,
        id: &str,
        expected_current: BookingStatus,
        new: BookingStatus,
    ) -> StorageResult<WriteOutcome<BookingStatus>> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("booking {} not found", id)))?;

        if booking.status != expected_current {
            return Ok(WriteOutcome::Conflict {
                current: booking.status,
            });
        }
        booking.status = new;
        Ok(WriteOutcome::Applied)
    }
}
