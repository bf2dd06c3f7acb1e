//! PERSISTING: sequential create-or-reuse and shelf attachment
//!
//! Items are written one at a time so that two detections of the same work
//! in one scan collapse onto one record. Besides the canonical keys checked
//! by the upsert, each detection's own lightweight and fuzzy-OCR keys are
//! remembered for the rest of the run, so a later detection with an equal
//! key reuses the earlier record even when enrichment spelled it differently.
//! Each item is its own atomic write; a failing item is skipped with a
//! warning.

use std::collections::HashMap;

use super::{Resolution, ScanOrchestrator, ScanRun};
use crate::models::{CollectableRecord, DetectedItem};
use crate::services::{fingerprint, record_builder};

/// Detection keys already resolved in this run
#[derive(Default)]
struct RunKeys {
    records: HashMap<String, CollectableRecord>,
}

impl RunKeys {
    fn keys(item: &DetectedItem) -> [String; 2] {
        [fingerprint::lightweight_for(item), fingerprint::fuzzy_for(item)]
    }

    fn lookup(&self, item: &DetectedItem) -> Option<&CollectableRecord> {
        Self::keys(item).iter().find_map(|key| self.records.get(key))
    }

    fn remember(&mut self, item: &DetectedItem, record: &CollectableRecord) {
        for key in Self::keys(item) {
            self.records.entry(key).or_insert_with(|| record.clone());
        }
    }
}

fn detection(resolution: &Resolution) -> &DetectedItem {
    match resolution {
        Resolution::Existing { item, .. }
        | Resolution::Catalog { item, .. }
        | Resolution::Enriched { item, .. } => item,
    }
}

impl ScanOrchestrator {
    pub(super) async fn phase_persisting(&self, run: &mut ScanRun) {
        let resolved = std::mem::take(&mut run.resolved);
        let (user_id, shelf_id, kind) = (run.request.user_id, run.request.shelf_id, run.request.kind);

        let mut seen = RunKeys::default();

        for resolution in resolved {
            let item = detection(&resolution);
            if let Some(record) = seen.lookup(item).cloned() {
                tracing::debug!(
                    job_id = %run.job_id(),
                    collectable_id = %record.id,
                    title = %item.title,
                    "Detection matches a record created earlier in this run"
                );
                let outcome = record_builder::attach_existing(&self.store, user_id, shelf_id, &record, item)
                    .await
                    .map(|()| record);
                let title = item.title.clone();
                record_outcome(run, &mut seen, &resolution, title, outcome);
                continue;
            }

            let (title, outcome) = match &resolution {
                Resolution::Existing { item, record, source } => {
                    tracing::debug!(
                        job_id = %run.job_id(),
                        collectable_id = %record.id,
                        source = source.as_str(),
                        "Reusing persisted record"
                    );
                    (
                        item.title.clone(),
                        record_builder::attach_existing(&self.store, user_id, shelf_id, record, item)
                            .await
                            .map(|()| record.clone()),
                    )
                }
                Resolution::Catalog { item, candidate } => {
                    let fields = record_builder::from_candidate(item, kind, candidate);
                    (
                        item.title.clone(),
                        record_builder::persist_and_attach(&self.store, user_id, shelf_id, fields)
                            .await,
                    )
                }
                Resolution::Enriched { item, enriched } => {
                    let fields = record_builder::from_enriched(item, kind, enriched);
                    (
                        item.title.clone(),
                        record_builder::persist_and_attach(&self.store, user_id, shelf_id, fields)
                            .await,
                    )
                }
            };

            record_outcome(run, &mut seen, &resolution, title, outcome);
        }

        tracing::info!(
            job_id = %run.job_id(),
            added_count = run.result.added_count,
            "Persisting finished"
        );
    }
}

fn record_outcome(
    run: &mut ScanRun,
    seen: &mut RunKeys,
    resolution: &Resolution,
    title: String,
    outcome: shelf_common::Result<CollectableRecord>,
) {
    match outcome {
        Ok(record) => {
            seen.remember(detection(resolution), &record);
            run.result.added_count += 1;
            if !run.result.collectable_ids.contains(&record.id) {
                run.result.collectable_ids.push(record.id);
            }
        }
        Err(e) => {
            tracing::warn!(
                job_id = %run.job_id(),
                title = %title,
                error = %e,
                "Failed to persist item, skipping"
            );
            run.warn(format!("Failed to save \"{}\": {}", title, e));
        }
    }
}
