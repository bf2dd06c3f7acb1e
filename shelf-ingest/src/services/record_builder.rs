//! Collectable record construction and the shared persist-and-attach step

use shelf_common::Result;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    CatalogCandidate, CollectableFields, CollectableRecord, DetectedItem, EnrichedItem,
    Fingerprints, Provenance, RecordSource, ShelfKind,
};
use crate::services::fingerprint;
use crate::services::gateways::PersistenceGateway;

fn fingerprints_for(
    title: &str,
    creator: Option<&str>,
    kind: ShelfKind,
    year: Option<i32>,
    format: Option<&str>,
    raw: &DetectedItem,
) -> Fingerprints {
    let mut fingerprints =
        Fingerprints::new(fingerprint::lightweight_fingerprint(title, creator, kind));
    fingerprints.strong =
        year.map(|y| fingerprint::strong_fingerprint(title, creator, kind, Some(y), format));
    fingerprints.add_fuzzy(fingerprint::fuzzy_for(raw));
    fingerprints
}

/// Record fields from a catalog-confirmed candidate
pub fn from_candidate(raw: &DetectedItem, kind: ShelfKind, candidate: &CatalogCandidate) -> CollectableFields {
    candidate_fields(raw, raw, kind, candidate)
}

/// Record fields from a candidate the user's edits matched
///
/// Fields the candidate lacks come from `edited`; `raw` only supplies the
/// fuzzy-OCR key.
pub fn from_reviewed_candidate(
    raw: &DetectedItem,
    edited: &DetectedItem,
    kind: ShelfKind,
    candidate: &CatalogCandidate,
) -> CollectableFields {
    candidate_fields(edited, raw, kind, candidate)
}

fn candidate_fields(
    fallback: &DetectedItem,
    raw: &DetectedItem,
    kind: ShelfKind,
    candidate: &CatalogCandidate,
) -> CollectableFields {
    let creator = candidate.creator.as_deref().or(fallback.creator());
    let year = candidate.year().or(fallback.hints.year);
    let format = candidate.format.clone().or_else(|| fallback.hints.format.clone());

    CollectableFields {
        title: candidate.title.clone(),
        creators: creator.map(|c| vec![c.to_string()]).unwrap_or_default(),
        kind,
        year,
        format: format.clone(),
        identifiers: candidate.identifiers.clone(),
        images: candidate.images.clone(),
        fingerprints: fingerprints_for(&candidate.title, creator, kind, year, format.as_deref(), raw),
        provenance: Provenance {
            source: RecordSource::Catalog,
            provider: Some(candidate.provider.clone()),
            confidence: fallback.confidence,
        },
    }
}

/// Record fields from an enrichment result
pub fn from_enriched(raw: &DetectedItem, kind: ShelfKind, enriched: &EnrichedItem) -> CollectableFields {
    let creator = enriched.primary_creator.as_deref().or(raw.creator());
    let year = enriched.year.or(raw.hints.year);
    let format = enriched.format.clone().or_else(|| raw.hints.format.clone());

    CollectableFields {
        title: enriched.title.clone(),
        creators: creator.map(|c| vec![c.to_string()]).unwrap_or_default(),
        kind,
        year,
        format: format.clone(),
        identifiers: Default::default(),
        images: Vec::new(),
        fingerprints: fingerprints_for(&enriched.title, creator, kind, year, format.as_deref(), raw),
        provenance: Provenance {
            source: RecordSource::Enrichment,
            provider: None,
            confidence: enriched.confidence,
        },
    }
}

/// Record fields from a user-edited detection
pub fn from_review(raw: &DetectedItem, edited: &DetectedItem, kind: ShelfKind) -> CollectableFields {
    let creator = edited.creator();
    let year = edited.hints.year;
    let format = edited.hints.format.clone();

    CollectableFields {
        title: edited.title.clone(),
        creators: creator.map(|c| vec![c.to_string()]).unwrap_or_default(),
        kind,
        year,
        format: format.clone(),
        identifiers: Default::default(),
        images: Vec::new(),
        fingerprints: fingerprints_for(&edited.title, creator, kind, year, format.as_deref(), raw),
        provenance: Provenance {
            source: RecordSource::Review,
            provider: None,
            confidence: edited.confidence,
        },
    }
}

/// Upsert and attach the surviving record to the shelf
///
/// The raw OCR key travels inside `fields` and is appended to an existing
/// record by the upsert.
pub async fn persist_and_attach(
    store: &Arc<dyn PersistenceGateway>,
    user_id: Uuid,
    shelf_id: Uuid,
    fields: CollectableFields,
) -> Result<CollectableRecord> {
    let outcome = store.upsert(fields).await?;
    store
        .attach_to_shelf(user_id, shelf_id, outcome.record.id)
        .await?;

    tracing::debug!(
        collectable_id = %outcome.record.id,
        created = outcome.created,
        title = %outcome.record.title,
        "Collectable attached to shelf"
    );
    Ok(outcome.record)
}

/// Attach an already-persisted record, appending the raw OCR key
pub async fn attach_existing(
    store: &Arc<dyn PersistenceGateway>,
    user_id: Uuid,
    shelf_id: Uuid,
    record: &CollectableRecord,
    raw: &DetectedItem,
) -> Result<()> {
    store
        .add_fuzzy_fingerprint(record.id, &fingerprint::fuzzy_for(raw))
        .await?;
    store.attach_to_shelf(user_id, shelf_id, record.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnrichmentRequest;

    #[test]
    fn test_candidate_fields_use_canonical_title_for_keys() {
        let raw = DetectedItem::new("DUNE ", ShelfKind::Book, 0.95);
        let candidate = CatalogCandidate::new("openlibrary", "Dune")
            .with_creator("Frank Herbert")
            .with_release_date("1965")
            .with_identifier("isbn", "9780441013593");

        let fields = from_candidate(&raw, ShelfKind::Book, &candidate);
        assert_eq!(fields.title, "Dune");
        assert_eq!(fields.primary_creator(), Some("Frank Herbert"));
        assert_eq!(fields.year, Some(1965));
        assert_eq!(
            fields.fingerprints.lightweight,
            fingerprint::lightweight_fingerprint("dune", Some("frank herbert"), ShelfKind::Book)
        );
        assert!(fields.fingerprints.strong.is_some());
        assert_eq!(fields.fingerprints.fuzzy_ocr, vec![fingerprint::fuzzy_for(&raw)]);
        assert_eq!(fields.provenance.source, RecordSource::Catalog);
        assert_eq!(fields.provenance.provider.as_deref(), Some("openlibrary"));
    }

    #[test]
    fn test_reviewed_candidate_falls_back_to_edits_not_raw_text() {
        let raw = DetectedItem::new("Dun3", ShelfKind::Book, 0.4).with_creator("F. Hebert");
        let edited = DetectedItem::new("Dune", ShelfKind::Book, 0.4).with_creator("Frank Herbert");
        let candidate = CatalogCandidate::new("openlibrary", "Dune");

        let fields = from_reviewed_candidate(&raw, &edited, ShelfKind::Book, &candidate);
        assert_eq!(fields.primary_creator(), Some("Frank Herbert"));
        assert_eq!(
            fields.fingerprints.lightweight,
            fingerprint::lightweight_fingerprint("Dune", Some("Frank Herbert"), ShelfKind::Book)
        );
        assert_eq!(fields.fingerprints.fuzzy_ocr, vec![fingerprint::fuzzy_for(&raw)]);
    }

    #[test]
    fn test_enriched_fallback_without_year_has_no_strong_key() {
        let raw = DetectedItem::new("Dun3", ShelfKind::Book, 0.88);
        let request = EnrichmentRequest {
            title: "Dun3".to_string(),
            creator: None,
        };
        let enriched = EnrichedItem::fallback(&request, ShelfKind::Book, "unparseable");
        let fields = from_enriched(&raw, ShelfKind::Book, &enriched);
        assert!(fields.fingerprints.strong.is_none());
        assert_eq!(fields.provenance.source, RecordSource::Enrichment);
        assert_eq!(fields.provenance.confidence, 0.5);
    }
}
