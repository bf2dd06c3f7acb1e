//! Shelf scan submission
//!
//! POST /shelves/:shelf_id/scans

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::UserId;
use crate::error::{ApiError, ApiResult};
use crate::models::{JobStatus, ShelfKind};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub kind: String,
    pub image_base64: String,
}

#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Accept a shelf photo and start its resolution run in the background
///
/// Returns 202 with the job id; the client polls `/jobs/:job_id`.
pub async fn start_scan(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(shelf_id): Path<Uuid>,
    Json(request): Json<StartScanRequest>,
) -> ApiResult<(StatusCode, Json<StartScanResponse>)> {
    let kind: ShelfKind = request.kind.parse().map_err(ApiError::BadRequest)?;

    let image = STANDARD
        .decode(strip_data_url(&request.image_base64))
        .map_err(|e| ApiError::BadRequest(format!("image_base64 is not valid base64: {}", e)))?;
    if image.is_empty() {
        return Err(ApiError::BadRequest("image_base64 is empty".to_string()));
    }

    let (handle, _task) = state.orchestrator.submit(user_id, shelf_id, kind, image).await;

    tracing::info!(
        job_id = %handle.job_id,
        user_id = %user_id,
        shelf_id = %shelf_id,
        kind = %kind,
        "Shelf scan accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            job_id: handle.job_id,
            status: JobStatus::Pending,
        }),
    ))
}

/// Accept `data:image/jpeg;base64,...` as well as bare base64
fn strip_data_url(input: &str) -> &str {
    let trimmed = input.trim();
    match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    }
}

pub fn scan_routes() -> Router<AppState> {
    Router::new().route("/shelves/:shelf_id/scans", post(start_scan))
}
