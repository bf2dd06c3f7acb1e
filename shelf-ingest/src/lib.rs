//! shelf-ingest library interface
//!
//! Turns shelf photographs into deduplicated catalog records: extraction,
//! confidence routing, fingerprint and catalog matching, enrichment,
//! persistence and review queueing, run as background jobs.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use shelf_common::events::EventBus;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::db::SqliteReviewQueue;
use crate::services::{JobTracker, ReviewService, ScanOrchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScanOrchestrator>,
    /// Same tracker the orchestrator reports into
    pub jobs: JobTracker,
    pub reviews: ReviewService,
    pub review_queue: SqliteReviewQueue,
    pub event_bus: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ScanOrchestrator>,
        reviews: ReviewService,
        review_queue: SqliteReviewQueue,
        event_bus: EventBus,
    ) -> Self {
        let jobs = orchestrator.jobs().clone();
        Self {
            orchestrator,
            jobs,
            reviews,
            review_queue,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::scan_routes())
        .merge(api::job_routes())
        .merge(api::review_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
