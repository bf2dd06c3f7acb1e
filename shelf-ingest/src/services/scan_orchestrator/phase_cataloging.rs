//! CATALOGING: catalog chain for unmatched High items

use super::{Resolution, ScanOrchestrator, ScanRun};
use crate::models::EnrichmentMode;

impl ScanOrchestrator {
    /// Unresolved items fall through to standard enrichment
    pub(super) async fn phase_cataloging(&self, run: &mut ScanRun) {
        let queue = std::mem::take(&mut run.catalog_queue);
        if queue.is_empty() {
            return;
        }

        let lookups = self.chain.resolve_batch(run.request.kind, &queue).await;
        let mut resolved = 0usize;

        for (item, lookup) in queue.into_iter().zip(lookups) {
            if let Some(warning) = lookup.warning {
                run.warn(warning);
            }
            match lookup.candidate {
                Some(candidate) => {
                    resolved += 1;
                    tracing::debug!(
                        job_id = %run.job_id(),
                        title = %item.title,
                        provider = %candidate.provider,
                        matched_title = %candidate.title,
                        "Catalog match"
                    );
                    run.resolved.push(Resolution::Catalog { item, candidate });
                }
                None => run.enrichment_queue.push((item, EnrichmentMode::Standard)),
            }
        }

        tracing::info!(
            job_id = %run.job_id(),
            resolved,
            unresolved = run.enrichment_queue.len(),
            "Catalog resolution finished"
        );
    }
}
