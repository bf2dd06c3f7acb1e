//! Data models for the shelf ingest service

pub mod candidate;
pub mod collectable;
pub mod detected_item;
pub mod enrichment;
pub mod job;
pub mod review;

pub use candidate::{CatalogCandidate, EditionMarker};
pub use collectable::{
    CollectableFields, CollectableRecord, Fingerprints, Provenance, RecordSource, ShelfItem,
};
pub use detected_item::{DetectedItem, ItemHints, ShelfKind};
pub use enrichment::{EnrichedItem, EnrichmentMode, EnrichmentRequest};
pub use job::{JobSnapshot, JobStatus, PipelineResult, PipelineStep, ProcessingJob};
pub use review::{ReviewEdits, ReviewItem, ReviewStatus};
