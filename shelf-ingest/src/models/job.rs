//! Scan job state machine
//!
//! A scan job progresses through the pipeline steps:
//! QUEUED → EXTRACTING → ROUTING → MATCHING → CATALOGING → ENRICHING →
//! FILTERING → PERSISTING → REVIEW_QUEUEING → DONE

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally visible job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Aborted
        )
    }
}

/// Pipeline stage the job is currently in (or stopped at)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStep {
    /// Accepted, run task not started yet
    Queued,
    /// Image → detected items
    Extracting,
    /// Confidence tier partition
    Routing,
    /// Fingerprint lookups for high and medium tiers
    Matching,
    /// Catalog resolution chain for unmatched high-tier items
    Cataloging,
    /// Standard and uncertain enrichment
    Enriching,
    /// Post-enrichment confidence gate
    Filtering,
    /// Upsert + attach to shelf
    Persisting,
    /// Parking unresolved detections for review
    ReviewQueueing,
    Done,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Queued => "QUEUED",
            PipelineStep::Extracting => "EXTRACTING",
            PipelineStep::Routing => "ROUTING",
            PipelineStep::Matching => "MATCHING",
            PipelineStep::Cataloging => "CATALOGING",
            PipelineStep::Enriching => "ENRICHING",
            PipelineStep::Filtering => "FILTERING",
            PipelineStep::Persisting => "PERSISTING",
            PipelineStep::ReviewQueueing => "REVIEW_QUEUEING",
            PipelineStep::Done => "DONE",
        }
    }

    /// Coarse progress fraction reported when entering this step
    pub fn progress(&self) -> f64 {
        match self {
            PipelineStep::Queued => 0.0,
            PipelineStep::Extracting => 0.05,
            PipelineStep::Routing => 0.2,
            PipelineStep::Matching => 0.3,
            PipelineStep::Cataloging => 0.45,
            PipelineStep::Enriching => 0.6,
            PipelineStep::Filtering => 0.75,
            PipelineStep::Persisting => 0.8,
            PipelineStep::ReviewQueueing => 0.9,
            PipelineStep::Done => 1.0,
        }
    }
}

/// Breakdown returned to the caller of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub added_count: usize,
    pub needs_review_count: usize,
    pub warnings: Vec<String>,
    /// Collectables attached to the shelf by this run
    #[serde(default)]
    pub collectable_ids: Vec<Uuid>,
}

/// In-memory job entry owned by the job tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub shelf_id: Uuid,
    pub status: JobStatus,
    pub step: PipelineStep,
    /// Fraction complete (0.0 - 1.0)
    pub progress: f64,
    pub abort_requested: bool,
    pub result: Option<PipelineResult>,
    /// Failure or abort message
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(user_id: Uuid, shelf_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            user_id,
            shelf_id,
            status: JobStatus::Pending,
            step: PipelineStep::Queued,
            progress: 0.0,
            abort_requested: false,
            result: None,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enter a pipeline step; no-op once the job is terminal
    pub fn transition_to(&mut self, step: PipelineStep) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Processing;
        self.step = step;
        self.progress = step.progress();
        self.updated_at = Utc::now();
    }

    /// Finish with a terminal status; the first terminal status wins
    pub fn finish(&mut self, status: JobStatus, message: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.message = message;
        if status == JobStatus::Completed {
            self.step = PipelineStep::Done;
            self.progress = 1.0;
        }
        self.updated_at = Utc::now();
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            shelf_id: self.shelf_id,
            status: self.status,
            step: self.step,
            progress: self.progress,
            abort_requested: self.abort_requested,
            result: self.result.clone(),
            message: self.message.clone(),
            created_at: self.created_at,
        }
    }
}

/// Poll response for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub shelf_id: Uuid,
    pub status: JobStatus,
    pub step: PipelineStep,
    pub progress: f64,
    pub abort_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}
