//! FILTERING: post-enrichment confidence gate

use super::{Resolution, ScanOrchestrator, ScanRun};
use crate::services::confidence_router::ConfidenceTier;

impl ScanOrchestrator {
    /// Enriched items below `min` go to review; the rest are accepted
    pub(super) fn phase_filtering(&self, run: &mut ScanRun) {
        let enriched = std::mem::take(&mut run.enriched);
        let mut rejected = 0usize;

        for (item, enriched) in enriched {
            if self.router.tier_of(enriched.confidence) == ConfidenceTier::Low {
                tracing::debug!(
                    job_id = %run.job_id(),
                    title = %item.title,
                    confidence = enriched.confidence,
                    "Enriched item below confidence floor"
                );
                rejected += 1;
                run.review_queue.push(item);
            } else {
                run.resolved.push(Resolution::Enriched { item, enriched });
            }
        }

        tracing::debug!(job_id = %run.job_id(), rejected, "Filtering finished");
    }
}
