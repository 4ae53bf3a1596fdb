//! Request handlers

use super::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use booking_engine::DispatchOutcome;
use booking_types::{CorrelationKey, DomainEvent, EventType, RunId, WorkflowRun};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub definitions: usize,
    pub pending_timers: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        definitions: state.orchestrator.definitions().count(),
        pending_timers: state.orchestrator.timer().len(),
    })
}

/// Inbound event body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub correlation_key: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub emitted_at: Option<DateTime<Utc>>,
}

/// Accept a domain event. Runs are created and cancellations applied before
/// the response; created runs are driven in the background.
pub async fn publish_event(
    State(state): State<AppState>,
    Json(request): Json<PublishEventRequest>,
) -> ApiResult<(StatusCode, Json<DispatchOutcome>)> {
    let event_type: EventType = request.event_type.parse()?;
    let emitted_at = request.emitted_at.unwrap_or_else(|| state.clock.now());

    let event = match (event_type, request.correlation_key) {
        (EventType::Maintenance, _) => DomainEvent::maintenance(emitted_at),
        (_, Some(key)) if !key.trim().is_empty() => DomainEvent::with_correlation_key(
            event_type,
            CorrelationKey::new(key),
            request.payload,
            emitted_at,
        )?,
        (_, _) => DomainEvent::new(event_type, request.payload, emitted_at)?,
    };

    let outcome = state.orchestrator.dispatch(&event).await?;
    state
        .orchestrator
        .drive_in_background(outcome.started.clone());

    tracing::info!(
        event = %event.event_type,
        correlation_key = %event.correlation_key,
        started = outcome.started.len(),
        cancelled = outcome.cancelled.len(),
        "Event accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowRun>> {
    let run = state.orchestrator.get_run(&RunId::new(id)).await?;
    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub correlation_key: Option<String>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<WorkflowRun>>> {
    let key = query
        .correlation_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("correlation_key is required".to_string()))?;

    let runs = state.orchestrator.runs_for(&CorrelationKey::new(key)).await?;
    Ok(Json(runs))
}
