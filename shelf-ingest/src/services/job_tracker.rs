//! In-memory job tracker
//!
//! Registry of background pipeline runs. Each entry carries the job state
//! plus the cancellation token the run polls at stage boundaries. Entries
//! expire a fixed TTL after creation regardless of state; an independent
//! sweeper task evicts them.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{JobSnapshot, JobStatus, PipelineResult, PipelineStep, ProcessingJob};

pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct JobEntry {
    job: ProcessingJob,
    cancel_token: CancellationToken,
}

/// Returned by [`JobTracker::create`]
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub cancel_token: CancellationToken,
}

#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
    ttl: Duration,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_TTL)
    }
}

impl JobTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a pending job for `user_id` on `shelf_id`
    pub async fn create(&self, user_id: Uuid, shelf_id: Uuid) -> JobHandle {
        let job = ProcessingJob::new(user_id, shelf_id);
        let handle = JobHandle {
            job_id: job.job_id,
            cancel_token: CancellationToken::new(),
        };

        self.jobs.write().await.insert(
            job.job_id,
            JobEntry {
                job,
                cancel_token: handle.cancel_token.clone(),
            },
        );

        tracing::debug!(job_id = %handle.job_id, user_id = %user_id, "Job created");
        handle
    }

    /// Snapshot visible to the owning user; expired jobs read as absent
    pub async fn get(&self, job_id: Uuid, user_id: Uuid) -> Option<JobSnapshot> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id)
            .filter(|entry| entry.job.user_id == user_id && !self.is_expired(&entry.job))
            .map(|entry| entry.job.snapshot())
    }

    /// Request cooperative cancellation
    ///
    /// Returns false when the job is absent, owned by someone else or already
    /// terminal.
    pub async fn abort(&self, job_id: Uuid, user_id: Uuid) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            return false;
        };
        if entry.job.user_id != user_id || entry.job.is_terminal() || self.is_expired(&entry.job) {
            return false;
        }

        entry.job.abort_requested = true;
        entry.job.updated_at = Utc::now();
        entry.cancel_token.cancel();
        tracing::info!(job_id = %job_id, step = entry.job.step.as_str(), "Abort requested");
        true
    }

    pub async fn is_abort_requested(&self, job_id: Uuid) -> bool {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.job.abort_requested)
            .unwrap_or(false)
    }

    pub async fn cancel_token(&self, job_id: Uuid) -> Option<CancellationToken> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.cancel_token.clone())
    }

    /// Record entry into a pipeline step (ignored once terminal)
    pub async fn transition(&self, job_id: Uuid, step: PipelineStep) {
        if let Some(entry) = self.jobs.write().await.get_mut(&job_id) {
            entry.job.transition_to(step);
        }
    }

    pub async fn complete(&self, job_id: Uuid, result: PipelineResult) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            return false;
        };
        if !entry.job.finish(JobStatus::Completed, None) {
            return false;
        }
        entry.job.result = Some(result);
        true
    }

    pub async fn fail(&self, job_id: Uuid, message: impl Into<String>) -> bool {
        self.finish(job_id, JobStatus::Failed, Some(message.into()), None)
            .await
    }

    /// Terminal `Aborted`; `partial` holds what was committed before the abort
    pub async fn mark_aborted(&self, job_id: Uuid, partial: Option<PipelineResult>) -> bool {
        self.finish(
            job_id,
            JobStatus::Aborted,
            Some("Aborted by user".to_string()),
            partial,
        )
        .await
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        message: Option<String>,
        result: Option<PipelineResult>,
    ) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            return false;
        };
        if !entry.job.finish(status, message) {
            return false;
        }
        if result.is_some() {
            entry.job.result = result;
        }
        true
    }

    /// Remove every job older than the TTL; returns the number evicted
    pub async fn sweep_expired(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| !self.is_expired(&entry.job));
        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = jobs.len(), "Swept expired jobs");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` until `shutdown` fires
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Job sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracker.sweep_expired().await;
                    }
                }
            }
        })
    }

    fn is_expired(&self, job: &ProcessingJob) -> bool {
        let age = Utc::now().signed_duration_since(job.created_at);
        age.to_std().map(|age| age >= self.ttl).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jobs_visible_only_to_owner() {
        let tracker = JobTracker::default();
        let owner = Uuid::new_v4();
        let handle = tracker.create(owner, Uuid::new_v4()).await;

        let snapshot = tracker.get(handle.job_id, owner).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert!(tracker.get(handle.job_id, Uuid::new_v4()).await.is_none());
        assert!(tracker.get(Uuid::new_v4(), owner).await.is_none());
    }

    #[tokio::test]
    async fn test_abort_sets_flag_and_cancels_token() {
        let tracker = JobTracker::default();
        let owner = Uuid::new_v4();
        let handle = tracker.create(owner, Uuid::new_v4()).await;

        assert!(!tracker.abort(handle.job_id, Uuid::new_v4()).await);
        assert!(!handle.cancel_token.is_cancelled());

        assert!(tracker.abort(handle.job_id, owner).await);
        assert!(handle.cancel_token.is_cancelled());
        assert!(tracker.is_abort_requested(handle.job_id).await);
        assert!(tracker.get(handle.job_id, owner).await.unwrap().abort_requested);
    }

    #[tokio::test]
    async fn test_abort_of_terminal_job_is_refused() {
        let tracker = JobTracker::default();
        let owner = Uuid::new_v4();
        let handle = tracker.create(owner, Uuid::new_v4()).await;

        assert!(tracker.complete(handle.job_id, PipelineResult::default()).await);
        assert!(!tracker.abort(handle.job_id, owner).await);
        assert!(!handle.cancel_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_first_terminal_state_wins() {
        let tracker = JobTracker::default();
        let owner = Uuid::new_v4();
        let handle = tracker.create(owner, Uuid::new_v4()).await;

        tracker.transition(handle.job_id, PipelineStep::Matching).await;
        assert!(tracker.mark_aborted(handle.job_id, None).await);
        assert!(!tracker.fail(handle.job_id, "late failure").await);
        assert!(!tracker.complete(handle.job_id, PipelineResult::default()).await);

        let snapshot = tracker.get(handle.job_id, owner).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Aborted);
        assert_eq!(snapshot.step, PipelineStep::Matching);
    }

    #[tokio::test]
    async fn test_unknown_job_cannot_finish() {
        let tracker = JobTracker::default();
        let missing = Uuid::new_v4();
        assert!(!tracker.complete(missing, PipelineResult::default()).await);
        assert!(!tracker.fail(missing, "boom").await);
        assert!(!tracker.mark_aborted(missing, None).await);
    }

    #[tokio::test]
    async fn test_complete_stores_result() {
        let tracker = JobTracker::default();
        let owner = Uuid::new_v4();
        let handle = tracker.create(owner, Uuid::new_v4()).await;

        let result = PipelineResult {
            added_count: 2,
            needs_review_count: 1,
            ..Default::default()
        };
        tracker.complete(handle.job_id, result.clone()).await;

        let snapshot = tracker.get(handle.job_id, owner).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress, 1.0);
        assert_eq!(snapshot.result, Some(result));
    }

    #[tokio::test]
    async fn test_ttl_expiry_and_sweep() {
        let tracker = JobTracker::new(Duration::from_millis(50));
        let owner = Uuid::new_v4();
        let handle = tracker.create(owner, Uuid::new_v4()).await;
        assert_eq!(tracker.sweep_expired().await, 0);

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Expired jobs read as absent even before the sweep
        assert!(tracker.get(handle.job_id, owner).await.is_none());
        assert!(!tracker.abort(handle.job_id, owner).await);
        assert_eq!(tracker.sweep_expired().await, 1);
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweeper_task_evicts_and_stops() {
        let tracker = JobTracker::new(Duration::from_millis(30));
        tracker.create(Uuid::new_v4(), Uuid::new_v4()).await;

        let shutdown = CancellationToken::new();
        let sweeper = tracker.spawn_sweeper(Duration::from_millis(10), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(tracker.is_empty().await);

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_creates() {
        let tracker = JobTracker::default();
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let tracker = tracker.clone();
            set.spawn(async move { tracker.create(Uuid::new_v4(), Uuid::new_v4()).await.job_id });
        }
        let mut ids = std::collections::HashSet::new();
        while let Some(id) = set.join_next().await {
            ids.insert(id.unwrap());
        }
        assert_eq!(ids.len(), 20);
        assert_eq!(tracker.len().await, 20);
    }
}
