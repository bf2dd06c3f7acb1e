//! MATCHING: persisted-record lookups for High and Medium items
//!
//! Persisted matches are reused as-is. They are not re-gated on confidence
//! later: the record already passed a gate when it was created.

use super::{Resolution, ScanOrchestrator, ScanRun};
use crate::models::{DetectedItem, EnrichmentMode};
use crate::services::matching::MatchTarget;

impl ScanOrchestrator {
    pub(super) async fn phase_matching(&self, run: &mut ScanRun) {
        let high = std::mem::take(&mut run.high);
        let medium = std::mem::take(&mut run.medium);

        for item in high {
            if !self.match_existing(run, &item).await {
                run.catalog_queue.push(item);
            }
        }
        for item in medium {
            if !self.match_existing(run, &item).await {
                run.enrichment_queue.push((item, EnrichmentMode::Uncertain));
            }
        }

        tracing::info!(
            job_id = %run.job_id(),
            matched = run.resolved.len(),
            to_catalog = run.catalog_queue.len(),
            to_enrichment = run.enrichment_queue.len(),
            "Fingerprint matching finished"
        );
    }

    /// True when `item` resolved to a persisted record
    async fn match_existing(&self, run: &mut ScanRun, item: &DetectedItem) -> bool {
        let best = match self.matching.find_best_match(item, false).await {
            Ok(best) => best,
            Err(e) => {
                // Treated as unmatched; the item still gets a chance downstream
                tracing::warn!(
                    job_id = %run.job_id(),
                    title = %item.title,
                    error = %e,
                    "Match lookup failed"
                );
                return false;
            }
        };

        match best.suggestion {
            Some(suggestion) => match suggestion.target {
                MatchTarget::Record(record) => {
                    tracing::debug!(
                        job_id = %run.job_id(),
                        title = %item.title,
                        collectable_id = %record.id,
                        source = suggestion.source.as_str(),
                        "Matched persisted record"
                    );
                    run.resolved.push(Resolution::Existing {
                        item: item.clone(),
                        record,
                        source: suggestion.source,
                    });
                    true
                }
                MatchTarget::Candidate(_) => false,
            },
            None => false,
        }
    }
}
