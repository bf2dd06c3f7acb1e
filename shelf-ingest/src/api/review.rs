//! Review queue adjudication
//!
//! GET /review, GET /review/:review_id, POST /review/:review_id/complete,
//! POST /review/:review_id/dismiss

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::UserId;
use crate::error::{ApiError, ApiResult};
use crate::models::{ReviewEdits, ReviewItem, ReviewStatus};
use crate::services::ReviewOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PendingReviewsResponse {
    pub items: Vec<ReviewItem>,
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub review_id: Uuid,
    pub status: ReviewStatus,
}

pub async fn list_pending(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> ApiResult<Json<PendingReviewsResponse>> {
    if !state.reviews.is_available() {
        return Err(ApiError::Unavailable("Review queue is unavailable".to_string()));
    }
    let items = state.review_queue.list_pending(user_id).await?;
    Ok(Json(PendingReviewsResponse { items }))
}

pub async fn get_review(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(review_id): Path<Uuid>,
) -> ApiResult<Json<ReviewItem>> {
    Ok(Json(state.reviews.get(review_id, user_id).await?))
}

/// Apply the user's edits and resolve the item through matching
pub async fn complete_review(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(review_id): Path<Uuid>,
    Json(edits): Json<ReviewEdits>,
) -> ApiResult<Json<ReviewOutcome>> {
    Ok(Json(state.reviews.complete(review_id, user_id, &edits).await?))
}

pub async fn dismiss_review(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(review_id): Path<Uuid>,
) -> ApiResult<Json<DismissResponse>> {
    state.reviews.dismiss(review_id, user_id).await?;
    Ok(Json(DismissResponse {
        review_id,
        status: ReviewStatus::Dismissed,
    }))
}

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/review", get(list_pending))
        .route("/review/:review_id", get(get_review))
        .route("/review/:review_id/complete", post(complete_review))
        .route("/review/:review_id/dismiss", post(dismiss_review))
}
