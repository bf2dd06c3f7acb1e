//! Scan pipeline orchestrator
//!
//! Drives one shelf photo through the resolution pipeline:
//!
//! EXTRACTING → ROUTING → MATCHING → CATALOGING → ENRICHING → FILTERING →
//! PERSISTING → REVIEW_QUEUEING → DONE
//!
//! Each stage lives in its own `phase_*` module. Between stages the run
//! polls its cancellation token; an abort stops the run before the next
//! stage starts, so nothing is persisted after the stage in progress.
//! Records committed earlier stay committed.
//!
//! Tier handling:
//! - **High**: fingerprint match, else catalog chain, else standard enrichment
//! - **Medium**: fingerprint match, else uncertain enrichment (no catalog)
//! - **Low**: review queue
//!
//! Enriched items are re-gated on their post-enrichment confidence: anything
//! below the router's `min` goes to review.

use chrono::Utc;
use shelf_common::events::{EventBus, ShelfEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{
    CatalogCandidate, CollectableRecord, DetectedItem, EnrichedItem, EnrichmentMode, JobStatus,
    PipelineResult, PipelineStep, ShelfKind,
};
use crate::services::catalog::CatalogChain;
use crate::services::confidence_router::ConfidenceRouter;
use crate::services::enrichment::EnrichmentService;
use crate::services::extraction::{ExtractionAdapter, ExtractionError};
use crate::services::gateways::{PersistenceGateway, ReviewQueueGateway};
use crate::services::job_tracker::{JobHandle, JobTracker};
use crate::services::matching::{MatchSource, MatchingService};

mod phase_cataloging;
mod phase_enrichment;
mod phase_extraction;
mod phase_filtering;
mod phase_matching;
mod phase_persisting;
mod phase_review;
mod phase_routing;

/// Why a run stopped before `Done`
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Aborted before {0}")]
    Aborted(&'static str),
}

/// One scan submitted for background processing
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub shelf_id: Uuid,
    pub kind: ShelfKind,
    pub image: Vec<u8>,
}

/// An item with a decided target record
#[derive(Debug, Clone)]
enum Resolution {
    /// Already persisted; matched by fingerprint, fuzzy key or similarity
    Existing {
        item: DetectedItem,
        record: CollectableRecord,
        source: MatchSource,
    },
    /// Confirmed by a catalog provider
    Catalog {
        item: DetectedItem,
        candidate: CatalogCandidate,
    },
    /// Completed by enrichment and above the confidence floor
    Enriched {
        item: DetectedItem,
        enriched: EnrichedItem,
    },
}

/// Working set threaded through the phases of one run
#[derive(Debug)]
struct ScanRun {
    request: ScanRequest,
    detected: Vec<DetectedItem>,
    high: Vec<DetectedItem>,
    medium: Vec<DetectedItem>,
    /// High-tier items with no persisted match
    catalog_queue: Vec<DetectedItem>,
    enrichment_queue: Vec<(DetectedItem, EnrichmentMode)>,
    enriched: Vec<(DetectedItem, EnrichedItem)>,
    resolved: Vec<Resolution>,
    review_queue: Vec<DetectedItem>,
    result: PipelineResult,
}

impl ScanRun {
    fn new(request: ScanRequest) -> Self {
        Self {
            request,
            detected: Vec::new(),
            high: Vec::new(),
            medium: Vec::new(),
            catalog_queue: Vec::new(),
            enrichment_queue: Vec::new(),
            enriched: Vec::new(),
            resolved: Vec::new(),
            review_queue: Vec::new(),
            result: PipelineResult::default(),
        }
    }

    fn job_id(&self) -> Uuid {
        self.request.job_id
    }

    fn warn(&mut self, warning: String) {
        self.result.warnings.push(warning);
    }
}

/// Already-built collaborators of the orchestrator
pub struct ScanServices {
    pub extraction: Arc<dyn ExtractionAdapter>,
    pub router: ConfidenceRouter,
    pub matching: MatchingService,
    pub chain: CatalogChain,
    pub enrichment: EnrichmentService,
    pub store: Arc<dyn PersistenceGateway>,
    pub review_queue: Arc<dyn ReviewQueueGateway>,
    pub jobs: JobTracker,
    pub event_bus: EventBus,
}

pub struct ScanOrchestrator {
    extraction: Arc<dyn ExtractionAdapter>,
    router: ConfidenceRouter,
    matching: MatchingService,
    chain: CatalogChain,
    enrichment: EnrichmentService,
    store: Arc<dyn PersistenceGateway>,
    review_queue: Arc<dyn ReviewQueueGateway>,
    jobs: JobTracker,
    event_bus: EventBus,
}

impl ScanOrchestrator {
    pub fn new(services: ScanServices) -> Self {
        Self {
            extraction: services.extraction,
            router: services.router,
            matching: services.matching,
            chain: services.chain,
            enrichment: services.enrichment,
            store: services.store,
            review_queue: services.review_queue,
            jobs: services.jobs,
            event_bus: services.event_bus,
        }
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    /// Register a job and start its run in the background
    ///
    /// Returns immediately with the job handle; progress is read from the
    /// job tracker.
    pub async fn submit(
        self: &Arc<Self>,
        user_id: Uuid,
        shelf_id: Uuid,
        kind: ShelfKind,
        image: Vec<u8>,
    ) -> (JobHandle, JoinHandle<JobStatus>) {
        let handle = self.jobs.create(user_id, shelf_id).await;
        let request = ScanRequest {
            job_id: handle.job_id,
            user_id,
            shelf_id,
            kind,
            image,
        };
        let task = self.spawn(request, handle.cancel_token.clone());
        (handle, task)
    }

    /// Run `request` on a spawned task
    pub fn spawn(self: &Arc<Self>, request: ScanRequest, cancel_token: CancellationToken) -> JoinHandle<JobStatus> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.execute(request, cancel_token).await })
    }

    /// Run every stage and leave the job in a terminal state
    pub async fn execute(&self, request: ScanRequest, cancel_token: CancellationToken) -> JobStatus {
        let start_time = std::time::Instant::now();
        let job_id = request.job_id;

        tracing::info!(
            job_id = %job_id,
            shelf_id = %request.shelf_id,
            kind = %request.kind,
            image_bytes = request.image.len(),
            "Starting scan pipeline"
        );
        self.event_bus.emit_lossy(ShelfEvent::ScanJobStarted {
            job_id,
            shelf_id: request.shelf_id,
            timestamp: Utc::now(),
        });

        let mut run = ScanRun::new(request);
        match self.run_stages(&mut run, &cancel_token).await {
            Ok(()) => {
                let result = std::mem::take(&mut run.result);
                tracing::info!(
                    job_id = %job_id,
                    added_count = result.added_count,
                    needs_review_count = result.needs_review_count,
                    warnings = result.warnings.len(),
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    "Scan pipeline completed"
                );
                self.event_bus.emit_lossy(ShelfEvent::ScanJobCompleted {
                    job_id,
                    added_count: result.added_count,
                    needs_review_count: result.needs_review_count,
                    warning_count: result.warnings.len(),
                    timestamp: Utc::now(),
                });
                self.jobs.complete(job_id, result).await;
                JobStatus::Completed
            }
            Err(PipelineError::Aborted(step)) => {
                tracing::info!(job_id = %job_id, step, "Scan pipeline aborted");
                self.event_bus.emit_lossy(ShelfEvent::ScanJobAborted {
                    job_id,
                    step: step.to_string(),
                    timestamp: Utc::now(),
                });
                let partial = std::mem::take(&mut run.result);
                self.jobs.mark_aborted(job_id, Some(partial)).await;
                JobStatus::Aborted
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(job_id = %job_id, error = %message, "Scan pipeline failed");
                self.event_bus.emit_lossy(ShelfEvent::ScanJobFailed {
                    job_id,
                    message: message.clone(),
                    timestamp: Utc::now(),
                });
                self.jobs.fail(job_id, message).await;
                JobStatus::Failed
            }
        }
    }

    async fn run_stages(&self, run: &mut ScanRun, cancel_token: &CancellationToken) -> Result<(), PipelineError> {
        self.checkpoint(run, PipelineStep::Extracting, cancel_token).await?;
        self.phase_extraction(run).await?;

        self.checkpoint(run, PipelineStep::Routing, cancel_token).await?;
        self.phase_routing(run);

        self.checkpoint(run, PipelineStep::Matching, cancel_token).await?;
        self.phase_matching(run).await;

        self.checkpoint(run, PipelineStep::Cataloging, cancel_token).await?;
        self.phase_cataloging(run).await;

        self.checkpoint(run, PipelineStep::Enriching, cancel_token).await?;
        self.phase_enrichment(run).await;

        self.checkpoint(run, PipelineStep::Filtering, cancel_token).await?;
        self.phase_filtering(run);

        self.checkpoint(run, PipelineStep::Persisting, cancel_token).await?;
        self.phase_persisting(run).await;

        self.checkpoint(run, PipelineStep::ReviewQueueing, cancel_token).await?;
        self.phase_review(run).await;

        Ok(())
    }

    /// Stage boundary: stop on abort, otherwise record and announce the next step
    async fn checkpoint(
        &self,
        run: &ScanRun,
        next: PipelineStep,
        cancel_token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel_token.is_cancelled() || self.jobs.is_abort_requested(run.job_id()).await {
            return Err(PipelineError::Aborted(next.as_str()));
        }

        self.jobs.transition(run.job_id(), next).await;
        self.event_bus.emit_lossy(ShelfEvent::ScanJobStepChanged {
            job_id: run.job_id(),
            step: next.as_str().to_string(),
            progress: next.progress(),
            timestamp: Utc::now(),
        });
        tracing::debug!(job_id = %run.job_id(), step = next.as_str(), "Entering pipeline step");
        Ok(())
    }
}
