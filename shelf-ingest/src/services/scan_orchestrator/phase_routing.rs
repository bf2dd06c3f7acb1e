//! ROUTING: confidence tiers

use super::{ScanOrchestrator, ScanRun};

impl ScanOrchestrator {
    /// Low-tier items go straight to the review queue
    pub(super) fn phase_routing(&self, run: &mut ScanRun) {
        let tiers = self.router.route(std::mem::take(&mut run.detected));

        tracing::info!(
            job_id = %run.job_id(),
            high = tiers.high.len(),
            medium = tiers.medium.len(),
            low = tiers.low.len(),
            "Routed detections"
        );

        run.high = tiers.high;
        run.medium = tiers.medium;
        run.review_queue.extend(tiers.low);
    }
}
