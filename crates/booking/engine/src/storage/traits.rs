use crate::storage::StorageResult;
use async_trait::async_trait;
use booking_types::{Booking, BookingStatus, CorrelationKey, RunId, RunStatus, WorkflowRun};
use chrono::{DateTime, Utc};

/// Outcome of a compare-and-swap status write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome<S> {
    Applied,
    /// The stored status was not the expected one; nothing was written.
    Conflict { current: S },
}

impl<S> WriteOutcome<S> {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// Storage interface for workflow runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a newly created run. Fails with `Conflict` if the id exists.
    async fn insert_run(&self, run: WorkflowRun) -> StorageResult<()>;

    async fn get_run(&self, id: &RunId) -> StorageResult<Option<WorkflowRun>>;

    /// Replace the stored run with `run` if the stored status is `expected`.
    async fn update_run(
        &self,
        run: &WorkflowRun,
        expected: RunStatus,
    ) -> StorageResult<WriteOutcome<RunStatus>>;

    /// Move a run from `expected` to `to` without touching anything else
    /// (the wake time is cleared unless `to` is `Sleeping`).
    async fn transition_run(
        &self,
        id: &RunId,
        expected: RunStatus,
        to: RunStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<WriteOutcome<RunStatus>>;

    /// Runs in any of the given statuses, oldest first.
    async fn list_runs_by_status(&self, statuses: &[RunStatus]) -> StorageResult<Vec<WorkflowRun>>;

    /// All runs sharing a correlation key, oldest first.
    async fn list_runs_by_correlation(
        &self,
        key: &CorrelationKey,
    ) -> StorageResult<Vec<WorkflowRun>>;
}

/// The slice of the marketplace's booking persistence the engine consumes.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_booking(&self, id: &str) -> StorageResult<Option<Booking>>;

    /// Set the booking status to `new` only if it currently is `expected_current`.
    async fn update_booking_status(
        &self,
        id: &str,
        expected_current: BookingStatus,
        new: BookingStatus,
    ) -> StorageResult<WriteOutcome<BookingStatus>>;
}
