//! PostgreSQL adapter for runs and bookings.
//!
//! Runs live in `booking_workflow_runs`, created on connect. Bookings live
//! in the marketplace's `bookings` table, which this adapter only reads and
//! conditionally updates (`UPDATE ... WHERE status = $expected`).

use crate::storage::traits::{BookingStore, RunStore, WriteOutcome};
use crate::storage::{StorageError, StorageResult};
use async_trait::async_trait;
use booking_types::{
    Booking, BookingStatus, CorrelationKey, DefinitionId, RunId, RunStatus, StepHistory,
    WorkflowRun,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

const RUN_COLUMNS: &str = "id, definition_id, correlation_key, status, current_step_index, \
     step_history, wake_at, payload, error, created_at, updated_at";

/// Booking status CAS. The marketplace owns the column's casing, so the
/// expected status is matched case-insensitively against every spelling.
const UPDATE_BOOKING_STATUS: &str =
    "UPDATE bookings SET status = $1 WHERE id = $2 AND lower(status) = ANY($3)";

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS booking_workflow_runs (
                id TEXT PRIMARY KEY,
                definition_id TEXT NOT NULL,
                correlation_key TEXT NOT NULL,
                status TEXT NOT NULL,
                current_step_index BIGINT NOT NULL,
                step_history JSONB NOT NULL,
                wake_at TIMESTAMPTZ,
                payload JSONB NOT NULL,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS booking_workflow_runs_correlation_idx \
             ON booking_workflow_runs (correlation_key)",
            "CREATE INDEX IF NOT EXISTS booking_workflow_runs_status_idx \
             ON booking_workflow_runs (status)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn current_run_status(&self, id: &RunId) -> StorageResult<RunStatus> {
        let row = sqlx::query("SELECT status FROM booking_workflow_runs WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound(format!("run {} not found", id)))?;
        parse_run_status(&row.try_get::<String, _>("status").map_err(backend)?)
    }
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn map_sqlx_conflict(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StorageError::Conflict(db.message().to_string())
        }
        _ => backend(e),
    }
}

fn parse_run_status(s: &str) -> StorageResult<RunStatus> {
    RunStatus::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("unknown run status '{s}'")))
}

fn parse_booking_status(s: &str) -> StorageResult<BookingStatus> {
    BookingStatus::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("unknown booking status '{s}'")))
}

fn row_to_run(row: &PgRow) -> StorageResult<WorkflowRun> {
    let history: Value = row.try_get("step_history").map_err(backend)?;
    let step_history: StepHistory = serde_json::from_value(history)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let index: i64 = row.try_get("current_step_index").map_err(backend)?;

    Ok(WorkflowRun {
        id: RunId::new(row.try_get::<String, _>("id").map_err(backend)?),
        definition_id: DefinitionId::new(
            row.try_get::<String, _>("definition_id").map_err(backend)?,
        ),
        correlation_key: CorrelationKey::new(
            row.try_get::<String, _>("correlation_key").map_err(backend)?,
        ),
        status: parse_run_status(&row.try_get::<String, _>("status").map_err(backend)?)?,
        current_step_index: usize::try_from(index)
            .map_err(|_| StorageError::Serialization(format!("negative step index {index}")))?,
        step_history,
        wake_at: row.try_get("wake_at").map_err(backend)?,
        payload: row.try_get("payload").map_err(backend)?,
        error: row.try_get("error").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn history_json(run: &WorkflowRun) -> StorageResult<Value> {
    serde_json::to_value(&run.step_history).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[async_trait]
impl RunStore for PostgresStore {
    async fn insert_run(&self, run: WorkflowRun) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO booking_workflow_runs
                (id, definition_id, correlation_key, status, current_step_index,
                 step_history, wake_at, payload, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&run.id.0)
        .bind(&run.definition_id.0)
        .bind(&run.correlation_key.0)
        .bind(run.status.as_str())
        .bind(run.current_step_index as i64)
        .bind(history_json(&run)?)
        .bind(run.wake_at)
        .bind(&run.payload)
        .bind(&run.error)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> StorageResult<Option<WorkflowRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM booking_workflow_runs WHERE id = $1"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_run).transpose()
    }

    async fn update_run(
        &self,
        run: &WorkflowRun,
        expected: RunStatus,
    ) -> StorageResult<WriteOutcome<RunStatus>> {
        if run.status != expected && !expected.can_transition_to(run.status) {
            return Err(StorageError::InvariantViolation(format!(
                "invalid run transition: {} -> {}",
                expected, run.status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE booking_workflow_runs
               SET status = $1,
                   current_step_index = $2,
                   step_history = $3,
                   wake_at = $4,
                   error = $5,
                   updated_at = $6
             WHERE id = $7 AND status = $8
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.current_step_index as i64)
        .bind(history_json(run)?)
        .bind(run.wake_at)
        .bind(&run.error)
        .bind(run.updated_at)
        .bind(&run.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(WriteOutcome::Applied);
        }
        Ok(WriteOutcome::Conflict {
            current: self.current_run_status(&run.id).await?,
        })
    }

    async fn transition_run(
        &self,
        id: &RunId,
        expected: RunStatus,
        to: RunStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<WriteOutcome<RunStatus>> {
        if !expected.can_transition_to(to) {
            return Err(StorageError::InvariantViolation(format!(
                "invalid run transition: {} -> {}",
                expected, to
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE booking_workflow_runs
               SET status = $1,
                   wake_at = CASE WHEN $1 = 'Sleeping' THEN wake_at ELSE NULL END,
                   updated_at = $2
             WHERE id = $3 AND status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(at)
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(WriteOutcome::Applied);
        }
        Ok(WriteOutcome::Conflict {
            current: self.current_run_status(id).await?,
        })
    }

    async fn list_runs_by_status(&self, statuses: &[RunStatus]) -> StorageResult<Vec<WorkflowRun>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM booking_workflow_runs \
             WHERE status = ANY($1) ORDER BY created_at ASC, id ASC"
        ))
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_run).collect()
    }

    async fn list_runs_by_correlation(
        &self,
        key: &CorrelationKey,
    ) -> StorageResult<Vec<WorkflowRun>> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM booking_workflow_runs \
             WHERE correlation_key = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(&key.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_run).collect()
    }
}

#[async_trait]
impl BookingStore for PostgresStore {
    async fn get_booking(&self, id: &str) -> StorageResult<Option<Booking>> {
        let row = sqlx::query(
            "SELECT id, status, confirmed_slot, time_slots FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let slots: Option<Value> = row.try_get("time_slots").map_err(backend)?;
        let time_slots = match slots {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            None => Vec::new(),
        };

        Ok(Some(Booking {
            id: row.try_get("id").map_err(backend)?,
            status: parse_booking_status(&row.try_get::<String, _>("status").map_err(backend)?)?,
            confirmed_slot: row.try_get("confirmed_slot").map_err(backend)?,
            time_slots,
        }))
    }

    async fn update_booking_status(
        &self,
        id: &str,
        expected_current: BookingStatus,
        new: BookingStatus,
    ) -> StorageResult<WriteOutcome<BookingStatus>> {
        let result = sqlx::query(UPDATE_BOOKING_STATUS)
            .bind(new.as_str())
            .bind(id)
            .bind(expected_current.spellings())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(WriteOutcome::Applied);
        }

        let current = self
            .get_booking(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("booking {} not found", id)))?;
        Ok(WriteOutcome::Conflict {
            current: current.status,
        })
    }
}
