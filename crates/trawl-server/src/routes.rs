use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use trawl_core::error::AppError;
use trawl_core::models::{RecordType, RunStatus};
use trawl_core::scheduler::{RescheduleOutcome, TriggerAck};
use trawl_core::traits::{JobStore, RecordFilter, RecordStore, RunStore};

use crate::dto::{
    ErrorResponse, HealthResponse, ListRecordsQuery, ListRunsQuery, RecordListResponse,
    RecordResponse, RunListResponse, RunResponse, SchedulerStatusResponse, TimerResponse,
    TriggerResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/jobs/{id}/run", post(trigger_run))
        .route("/v1/jobs/{id}/reschedule", post(reschedule_job))
        .route("/v1/jobs/{id}/runs", get(list_runs))
        .route("/v1/scheduler", get(scheduler_status))
        .route("/v1/records", get(list_records));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/jobs/{id}/run",
    params(
        ("id" = Uuid, Path, description = "Job configuration ID")
    ),
    responses(
        (status = 202, description = "Run started in the background", body = TriggerResponse),
        (status = 400, description = "Job is inactive", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "A run of this job is already in progress", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state
        .db
        .job_repo()
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {id}")))?;

    match state.scheduler.trigger(&config)? {
        TriggerAck::Started => {
            let response = TriggerResponse {
                job_id: id,
                status: "started".to_string(),
            };
            Ok((StatusCode::ACCEPTED, axum::Json(response)).into_response())
        }
        TriggerAck::AlreadyRunning => {
            let body = ErrorResponse {
                error: "conflict".to_string(),
                message: format!("Job {id} is already running"),
            };
            Ok((StatusCode::CONFLICT, axum::Json(body)).into_response())
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/jobs/{id}/reschedule",
    params(
        ("id" = Uuid, Path, description = "Job configuration ID")
    ),
    responses(
        (status = 204, description = "Timer now matches the stored configuration"),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 503, description = "Job store unavailable", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn reschedule_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.scheduler.reschedule(id).await {
        RescheduleOutcome::Scheduled | RescheduleOutcome::Unscheduled => {
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        RescheduleOutcome::Missing => Err(ApiError::not_found(format!("Job not found: {id}"))),
        RescheduleOutcome::StoreUnavailable => {
            let body = ErrorResponse {
                error: "unavailable".to_string(),
                message: "Job store unavailable, timers left unchanged".to_string(),
            };
            Ok((StatusCode::SERVICE_UNAVAILABLE, axum::Json(body)).into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}/runs",
    params(
        ("id" = Uuid, Path, description = "Job configuration ID"),
        ListRunsQuery,
    ),
    responses(
        (status = 200, description = "Runs, newest first", body = RunListResponse),
        (status = 400, description = "Bad status filter", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    tag = "runs"
)]
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status: Option<RunStatus> = query
        .status
        .map(|s| s.parse().map_err(AppError::Validation))
        .transpose()?;

    if state.db.job_repo().get_job(id).await?.is_none() {
        return Err(ApiError::not_found(format!("Job not found: {id}")));
    }

    let limit = query.limit.unwrap_or(20).min(100);
    let runs = state.db.run_repo().list_runs(id, status, limit).await?;
    let total = runs.len();

    let response = RunListResponse {
        runs: runs.into_iter().map(RunResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/records",
    params(ListRecordsQuery),
    responses(
        (status = 200, description = "Records, most recently captured first", body = RecordListResponse),
        (status = 400, description = "Bad record type filter", body = ErrorResponse),
    ),
    tag = "records"
)]
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let record_type: Option<RecordType> = query
        .record_type
        .map(|t| t.parse().map_err(AppError::Validation))
        .transpose()?;

    let filter = RecordFilter {
        job_id: query.job_id,
        record_type,
        limit: query.limit.unwrap_or(50).min(500),
    };
    let records = state.db.record_repo().list_records(&filter).await?;
    let total = records.len();

    let response = RecordListResponse {
        records: records.into_iter().map(RecordResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/scheduler",
    responses(
        (status = 200, description = "Registered timers", body = SchedulerStatusResponse),
    ),
    tag = "system"
)]
pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timers: Vec<TimerResponse> = state
        .scheduler
        .timers()
        .into_iter()
        .map(TimerResponse::from)
        .collect();

    axum::Json(SchedulerStatusResponse {
        overlap_policy: state.scheduler.overlap().to_string(),
        total: timers.len(),
        timers,
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
        timers: state.scheduler.timers().len(),
    };

    (status, axum::Json(response))
}
