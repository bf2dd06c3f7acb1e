//! ENRICHING: batch enrichment, one call per mode

use super::{ScanOrchestrator, ScanRun};
use crate::models::{DetectedItem, EnrichmentMode, EnrichmentRequest};

impl ScanOrchestrator {
    pub(super) async fn phase_enrichment(&self, run: &mut ScanRun) {
        let queue = std::mem::take(&mut run.enrichment_queue);
        if queue.is_empty() {
            return;
        }

        let (standard, uncertain): (Vec<_>, Vec<_>) = queue
            .into_iter()
            .partition(|(_, mode)| *mode == EnrichmentMode::Standard);

        for (batch, mode) in [
            (standard, EnrichmentMode::Standard),
            (uncertain, EnrichmentMode::Uncertain),
        ] {
            let items: Vec<DetectedItem> = batch.into_iter().map(|(item, _)| item).collect();
            if items.is_empty() {
                continue;
            }

            let requests: Vec<EnrichmentRequest> = items
                .iter()
                .map(|item| EnrichmentRequest {
                    title: item.title.clone(),
                    creator: item.creator().map(str::to_string),
                })
                .collect();
            let enriched = self
                .enrichment
                .enrich(&requests, run.request.kind, mode)
                .await;

            let degraded = enriched.iter().filter(|e| e.degraded).count();
            if degraded > 0 {
                run.warn(format!(
                    "{} of {} {} enrichment results used fallback records",
                    degraded,
                    items.len(),
                    mode.as_str()
                ));
            }
            tracing::info!(
                job_id = %run.job_id(),
                mode = mode.as_str(),
                batch = items.len(),
                degraded,
                "Enrichment finished"
            );

            run.enriched.extend(items.into_iter().zip(enriched));
        }
    }
}
