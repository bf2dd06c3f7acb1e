//! REVIEW_QUEUEING: park uncertain items for a human decision

use super::{ScanOrchestrator, ScanRun};

impl ScanOrchestrator {
    /// Items are dropped with a warning when the review queue is unavailable
    pub(super) async fn phase_review(&self, run: &mut ScanRun) {
        let queue = std::mem::take(&mut run.review_queue);
        if queue.is_empty() {
            return;
        }

        let (user_id, shelf_id) = (run.request.user_id, run.request.shelf_id);
        let mut dropped = 0usize;

        for item in queue {
            if !self.review_queue.is_available() {
                dropped += 1;
                continue;
            }
            match self.review_queue.enqueue(user_id, shelf_id, &item).await {
                Ok(Some(review)) => {
                    tracing::debug!(
                        job_id = %run.job_id(),
                        review_id = %review.id,
                        title = %item.title,
                        confidence = item.confidence,
                        "Queued for review"
                    );
                    run.result.needs_review_count += 1;
                }
                Ok(None) => dropped += 1,
                Err(e) => {
                    tracing::warn!(
                        job_id = %run.job_id(),
                        title = %item.title,
                        error = %e,
                        "Failed to queue review item"
                    );
                    run.warn(format!("Failed to queue \"{}\" for review: {}", item.title, e));
                }
            }
        }

        if dropped > 0 {
            tracing::warn!(job_id = %run.job_id(), dropped, "Review queue unavailable, items dropped");
            run.warn(format!(
                "Review queue unavailable: {} item(s) needing review were dropped",
                dropped
            ));
        }
    }
}
