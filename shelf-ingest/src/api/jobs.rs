//! Job polling and abort
//!
//! GET /jobs/:job_id, POST /jobs/:job_id/abort

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::UserId;
use crate::error::{ApiError, ApiResult};
use crate::models::JobSnapshot;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AbortJobResponse {
    pub job_id: Uuid,
    pub aborted: bool,
}

/// Current state of a job owned by the caller
pub async fn get_job(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobSnapshot>> {
    state
        .jobs
        .get(job_id, user_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", job_id)))
}

/// Request cooperative cancellation
///
/// `aborted` is false when the job is unknown, expired, owned by someone
/// else or already finished.
pub async fn abort_job(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(job_id): Path<Uuid>,
) -> Json<AbortJobResponse> {
    let aborted = state.jobs.abort(job_id, user_id).await;
    tracing::info!(job_id = %job_id, user_id = %user_id, aborted, "Abort requested");
    Json(AbortJobResponse { job_id, aborted })
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/abort", post(abort_job))
}
