//! Resolution services

pub mod catalog;
pub mod confidence_router;
pub mod enrichment;
pub mod extraction;
pub mod fingerprint;
pub mod gateways;
pub mod job_tracker;
pub mod matching;
pub mod rate_limiter;
pub mod record_builder;
pub mod review;
pub mod scan_orchestrator;

pub use catalog::{AdapterSettings, CatalogChain, CatalogProvider, ProviderAdapter, ProviderError};
pub use confidence_router::{ConfidenceRouter, ConfidenceThresholds, ConfidenceTier};
pub use enrichment::{EnrichmentProvider, EnrichmentService};
pub use extraction::{ExtractionAdapter, ExtractionError};
pub use gateways::{PersistenceGateway, ReviewQueueGateway, UpsertOutcome};
pub use job_tracker::{JobHandle, JobTracker};
pub use matching::{MatchSource, MatchingService, SearchOptions, SearchResult};
pub use review::{ReviewError, ReviewOutcome, ReviewService};
pub use scan_orchestrator::{PipelineError, ScanOrchestrator, ScanRequest, ScanServices};
