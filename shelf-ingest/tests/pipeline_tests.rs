//! End-to-end pipeline runs over in-memory SQLite with scripted adapters

mod common;

use common::{dune_candidate, CannedCatalog, Harness, ScriptedExtraction, TableEnrichment};
use serde_json::json;
use shelf_common::events::ShelfEvent;
use shelf_ingest::models::{DetectedItem, EnrichmentMode, JobStatus, RecordSource, ShelfKind};
use shelf_ingest::services::gateways::PersistenceGateway;
use shelf_ingest::services::record_builder;
use shelf_ingest::services::ExtractionError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

async fn run_scan(harness: &Harness, user_id: Uuid, shelf_id: Uuid) -> (Uuid, JobStatus) {
    let (handle, task) = harness
        .orchestrator
        .submit(user_id, shelf_id, ShelfKind::Book, vec![0xFF, 0xD8])
        .await;
    let status = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("pipeline run timed out")
        .unwrap();
    (handle.job_id, status)
}

#[tokio::test]
async fn test_exact_catalog_hit_creates_one_record() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![DetectedItem::new("Dune", ShelfKind::Book, 0.95)]),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default(),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let snapshot = harness.jobs.get(job_id, user_id).await.unwrap();
    let result = snapshot.result.unwrap();
    assert_eq!(result.added_count, 1);
    assert_eq!(result.needs_review_count, 0);
    assert!(result.warnings.is_empty());
    assert_eq!(snapshot.progress, 1.0);

    let shelf = harness.store.shelf_contents(user_id, shelf_id).await.unwrap();
    assert_eq!(shelf.len(), 1);
    assert_eq!(shelf[0].title, "Dune");
    assert_eq!(shelf[0].primary_creator(), Some("Frank Herbert"));
    assert_eq!(shelf[0].year, Some(1965));
    assert_eq!(shelf[0].provenance.source, RecordSource::Catalog);
    assert_eq!(shelf[0].provenance.provider.as_deref(), Some("canned"));
    assert!(shelf[0].fingerprints.strong.is_some());
    assert_eq!(harness.catalog.call_count(), 1);
    assert!(harness.enrichment.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_medium_item_reuses_lightweight_match_without_catalog() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![
            DetectedItem::new("dune", ShelfKind::Book, 0.88).with_creator("Frank Herbert")
        ]),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default(),
    )
    .await;

    // Record created by an earlier scan
    let seed = DetectedItem::new("Dune", ShelfKind::Book, 0.95);
    let fields = record_builder::from_candidate(&seed, ShelfKind::Book, &dune_candidate());
    let existing = harness.store.upsert(fields).await.unwrap().record;

    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());
    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert_eq!(result.added_count, 1);
    assert_eq!(result.collectable_ids, vec![existing.id]);
    assert_eq!(harness.catalog.call_count(), 0);
    assert!(harness.enrichment.calls.lock().unwrap().is_empty());
    assert_eq!(harness.store.count().await.unwrap(), 1);

    let shelf = harness.store.shelf_contents(user_id, shelf_id).await.unwrap();
    assert_eq!(shelf.len(), 1);
    assert_eq!(shelf[0].id, existing.id);
}

#[tokio::test]
async fn test_low_confidence_item_goes_to_review() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![DetectedItem::new("???", ShelfKind::Book, 0.3)]),
        CannedCatalog::books(),
        TableEnrichment::default(),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert_eq!(result.added_count, 0);
    assert_eq!(result.needs_review_count, 1);
    assert_eq!(harness.store.count().await.unwrap(), 0);
    assert_eq!(harness.catalog.call_count(), 0);

    let pending = harness.review_queue.list_pending(user_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].raw.title, "???");
    assert_eq!(pending[0].shelf_id, shelf_id);
}

#[tokio::test]
async fn test_malformed_enrichment_degrades_to_fallback_and_batch_continues() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![
            DetectedItem::new("Hyperion", ShelfKind::Book, 0.87),
            DetectedItem::new("Smudged Spine", ShelfKind::Book, 0.86),
        ]),
        CannedCatalog::books(),
        TableEnrichment::default().with(
            "Hyperion",
            json!({ "title": "Hyperion", "primary_creator": "Dan Simmons", "confidence": 0.93, "year": 1989 }),
        ),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    // The fallback record carries confidence 0.5, below the floor
    assert_eq!(result.added_count, 1);
    assert_eq!(result.needs_review_count, 1);
    assert!(result.warnings.iter().any(|w| w.contains("fallback")));

    // Medium tier: uncertain mode, catalog never consulted
    assert_eq!(
        *harness.enrichment.calls.lock().unwrap(),
        vec![(EnrichmentMode::Uncertain, 2)]
    );
    assert_eq!(harness.catalog.call_count(), 0);

    let shelf = harness.store.shelf_contents(user_id, shelf_id).await.unwrap();
    assert_eq!(shelf.len(), 1);
    assert_eq!(shelf[0].title, "Hyperion");
    assert_eq!(shelf[0].provenance.source, RecordSource::Enrichment);

    let pending = harness.review_queue.list_pending(user_id).await.unwrap();
    assert_eq!(pending[0].raw.title, "Smudged Spine");
}

#[tokio::test]
async fn test_unresolved_high_item_falls_back_to_standard_enrichment() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![
            DetectedItem::new("Piranesi", ShelfKind::Book, 0.97).with_creator("Susanna Clarke")
        ]),
        CannedCatalog::books(),
        TableEnrichment::default().with(
            "Piranesi",
            json!({ "title": "Piranesi", "author": "Susanna Clarke", "confidence": 0.95 }),
        ),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert_eq!(result.added_count, 1);
    assert!(harness.catalog.call_count() >= 1);
    assert_eq!(
        *harness.enrichment.calls.lock().unwrap(),
        vec![(EnrichmentMode::Standard, 1)]
    );
}

#[tokio::test]
async fn test_duplicate_detections_collapse_onto_one_record() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![
            DetectedItem::new("Dune", ShelfKind::Book, 0.95),
            DetectedItem::new("DUNE ", ShelfKind::Book, 0.96),
        ]),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default(),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert_eq!(result.collectable_ids.len(), 1);
    assert_eq!(harness.store.count().await.unwrap(), 1);
    assert_eq!(harness.store.shelf_contents(user_id, shelf_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_same_detection_across_tiers_reuses_record_created_in_run() {
    // The enriched spelling of the creator differs from the catalog's, so
    // only the detection's own keys tie the two items together
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![
            DetectedItem::new("Dune", ShelfKind::Book, 0.95),
            DetectedItem::new("Dune", ShelfKind::Book, 0.88),
        ]),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default().with(
            "Dune",
            json!({ "title": "Dune", "primary_creator": "Herbert, Frank", "confidence": 0.9 }),
        ),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert_eq!(result.added_count, 2);
    assert_eq!(result.collectable_ids.len(), 1);
    assert_eq!(harness.store.count().await.unwrap(), 1);

    let shelf = harness.store.shelf_contents(user_id, shelf_id).await.unwrap();
    assert_eq!(shelf.len(), 1);
    assert_eq!(shelf[0].primary_creator(), Some("Frank Herbert"));
}

#[tokio::test]
async fn test_failed_write_skips_item_and_batch_continues() {
    let harness = Harness::with_failing_upsert(
        ScriptedExtraction::returning(vec![
            DetectedItem::new("Hyperion", ShelfKind::Book, 0.87),
            DetectedItem::new("Dune", ShelfKind::Book, 0.95),
        ]),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default().with(
            "Hyperion",
            json!({ "title": "Hyperion", "primary_creator": "Dan Simmons", "confidence": 0.93 }),
        ),
        "Hyperion",
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert_eq!(result.added_count, 1);
    assert_eq!(result.collectable_ids.len(), 1);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Hyperion") && w.contains("disk full")));

    let shelf = harness.store.shelf_contents(user_id, shelf_id).await.unwrap();
    assert_eq!(shelf.len(), 1);
    assert_eq!(shelf[0].title, "Dune");
}

#[tokio::test]
async fn test_rate_limited_catalog_warns_and_run_continues() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![
            DetectedItem::new("Piranesi", ShelfKind::Book, 0.97),
            DetectedItem::new("Dune", ShelfKind::Book, 0.95),
        ]),
        CannedCatalog::books()
            .with("Dune", dune_candidate())
            .rate_limited("Piranesi"),
        TableEnrichment::default().with(
            "Piranesi",
            json!({ "title": "Piranesi", "primary_creator": "Susanna Clarke", "confidence": 0.95 }),
        ),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("canned") && w.contains("Piranesi") && w.contains("Rate limit")));
    assert_eq!(result.added_count, 2);
    assert_eq!(
        *harness.enrichment.calls.lock().unwrap(),
        vec![(EnrichmentMode::Standard, 1)]
    );

    let mut titles: Vec<String> = harness
        .store
        .shelf_contents(user_id, shelf_id)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Dune", "Piranesi"]);
}

#[tokio::test]
async fn test_extraction_failure_fails_the_job() {
    let harness = Harness::new(
        ScriptedExtraction::failing(ExtractionError::Api(502, "bad gateway".to_string())),
        CannedCatalog::books(),
        TableEnrichment::default(),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Failed);

    let snapshot = harness.jobs.get(job_id, user_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.message.unwrap().contains("502"));
    assert!(snapshot.result.is_none());
    assert_eq!(harness.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_abort_between_stages_persists_nothing() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let harness = Harness::new(
        ScriptedExtraction::gated(
            vec![DetectedItem::new("Dune", ShelfKind::Book, 0.95)],
            started.clone(),
            release.clone(),
        ),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default(),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (handle, task) = harness
        .orchestrator
        .submit(user_id, shelf_id, ShelfKind::Book, vec![1, 2, 3])
        .await;

    // Extraction is in flight: request the abort, then let it finish
    started.notified().await;
    assert!(harness.jobs.abort(handle.job_id, user_id).await);
    release.notify_one();

    let status = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, JobStatus::Aborted);

    let snapshot = harness.jobs.get(handle.job_id, user_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Aborted);
    assert!(snapshot.abort_requested);
    assert_eq!(harness.store.count().await.unwrap(), 0);
    assert_eq!(harness.catalog.call_count(), 0);

    // Abort of a finished job is refused
    assert!(!harness.jobs.abort(handle.job_id, user_id).await);
}

#[tokio::test]
async fn test_review_queue_missing_drops_items_with_warning() {
    let pool = common::memory_pool().await;
    sqlx::query("DROP TABLE review_items").execute(&pool).await.unwrap();

    let harness = Harness::with_pool(
        pool,
        ScriptedExtraction::returning(vec![
            DetectedItem::new("???", ShelfKind::Book, 0.2),
            DetectedItem::new("Dune", ShelfKind::Book, 0.95),
        ]),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default(),
    )
    .await;
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, status) = run_scan(&harness, user_id, shelf_id).await;
    assert_eq!(status, JobStatus::Completed);

    let result = harness.jobs.get(job_id, user_id).await.unwrap().result.unwrap();
    assert_eq!(result.added_count, 1);
    assert_eq!(result.needs_review_count, 0);
    assert!(result.warnings.iter().any(|w| w.contains("Review queue unavailable")));
    assert!(!harness.reviews.is_available());
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let harness = Harness::new(
        ScriptedExtraction::returning(vec![DetectedItem::new("Dune", ShelfKind::Book, 0.95)]),
        CannedCatalog::books().with("Dune", dune_candidate()),
        TableEnrichment::default(),
    )
    .await;
    let mut events = harness.event_bus.subscribe();
    let (user_id, shelf_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (job_id, _) = run_scan(&harness, user_id, shelf_id).await;

    let mut steps = Vec::new();
    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.job_id(), job_id);
        match event {
            ShelfEvent::ScanJobStepChanged { step, .. } => steps.push(step),
            ShelfEvent::ScanJobCompleted { added_count, .. } => completed = Some(added_count),
            _ => {}
        }
    }
    assert_eq!(steps.first().map(String::as_str), Some("EXTRACTING"));
    assert_eq!(steps.last().map(String::as_str), Some("REVIEW_QUEUEING"));
    assert_eq!(completed, Some(1));
}
