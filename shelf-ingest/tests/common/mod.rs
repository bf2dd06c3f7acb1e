//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use shelf_common::events::EventBus;
use shelf_ingest::db::{create_schema, SqliteCatalogStore, SqliteReviewQueue};
use shelf_ingest::models::{
    CatalogCandidate, CollectableFields, CollectableRecord, DetectedItem, EnrichmentMode,
    EnrichmentRequest, ShelfItem, ShelfKind,
};
use shelf_ingest::services::catalog::SearchQuery;
use shelf_ingest::services::enrichment::EnrichmentError;
use shelf_ingest::services::fingerprint::FingerprintKind;
use shelf_ingest::services::gateways::UpsertOutcome;
use shelf_ingest::services::{
    AdapterSettings, CatalogChain, CatalogProvider, ConfidenceRouter, ConfidenceThresholds,
    EnrichmentProvider, EnrichmentService, ExtractionAdapter, ExtractionError, JobTracker,
    MatchingService, PersistenceGateway, ProviderAdapter, ProviderError, ReviewQueueGateway,
    ReviewService, ScanOrchestrator, ScanServices,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

pub async fn memory_pool() -> SqlitePool {
    // One connection: every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}

/// Extraction adapter returning a fixed detection list
///
/// With a gate set, `detect` announces itself on `started` and waits for
/// `release` before returning.
pub struct ScriptedExtraction {
    items: Mutex<Option<Result<Vec<DetectedItem>, ExtractionError>>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedExtraction {
    pub fn returning(items: Vec<DetectedItem>) -> Self {
        Self {
            items: Mutex::new(Some(Ok(items))),
            gate: None,
        }
    }

    pub fn failing(error: ExtractionError) -> Self {
        Self {
            items: Mutex::new(Some(Err(error))),
            gate: None,
        }
    }

    pub fn gated(items: Vec<DetectedItem>, started: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            items: Mutex::new(Some(Ok(items))),
            gate: Some((started, release)),
        }
    }
}

#[async_trait]
impl ExtractionAdapter for ScriptedExtraction {
    async fn detect(&self, _image: &[u8], _kind: ShelfKind) -> Result<Vec<DetectedItem>, ExtractionError> {
        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }
        self.items
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Enrichment provider answering from a title-keyed table
///
/// Titles missing from the table get an unparseable entry.
#[derive(Default)]
pub struct TableEnrichment {
    answers: HashMap<String, serde_json::Value>,
    pub calls: Mutex<Vec<(EnrichmentMode, usize)>>,
}

impl TableEnrichment {
    pub fn with(mut self, title: &str, answer: serde_json::Value) -> Self {
        self.answers.insert(title.to_string(), answer);
        self
    }
}

#[async_trait]
impl EnrichmentProvider for TableEnrichment {
    async fn enrich_raw(
        &self,
        items: &[EnrichmentRequest],
        _kind: ShelfKind,
        mode: EnrichmentMode,
    ) -> Result<Vec<serde_json::Value>, EnrichmentError> {
        self.calls.lock().unwrap().push((mode, items.len()));
        Ok(items
            .iter()
            .map(|item| {
                self.answers
                    .get(&item.title)
                    .cloned()
                    .unwrap_or_else(|| json!({ "unexpected": "shape" }))
            })
            .collect())
    }
}

/// Catalog provider with canned results keyed by lowercase title
pub struct CannedCatalog {
    kinds: Vec<ShelfKind>,
    results: HashMap<String, Vec<CatalogCandidate>>,
    rate_limited: HashSet<String>,
    pub calls: AtomicUsize,
}

impl CannedCatalog {
    pub fn books() -> Self {
        Self {
            kinds: vec![ShelfKind::Book],
            results: HashMap::new(),
            rate_limited: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every search for `title` answers with a rate-limit error
    pub fn rate_limited(mut self, title: &str) -> Self {
        self.rate_limited.insert(title.to_lowercase());
        self
    }

    pub fn with(mut self, title: &str, candidate: CatalogCandidate) -> Self {
        self.results
            .entry(title.to_lowercase())
            .or_default()
            .push(candidate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogProvider for CannedCatalog {
    fn name(&self) -> &str {
        "canned"
    }

    fn supports_shelf_type(&self, kind: ShelfKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogCandidate>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let title = query.title.trim().to_lowercase();
        if self.rate_limited.contains(&title) {
            return Err(ProviderError::RateLimited);
        }
        Ok(self
            .results
            .get(&title)
            .cloned()
            .unwrap_or_default())
    }
}

/// SQLite store whose upserts fail for one record title
pub struct FailingStore {
    inner: SqliteCatalogStore,
    failing_title: String,
}

impl FailingStore {
    pub fn new(inner: SqliteCatalogStore, failing_title: &str) -> Self {
        Self {
            inner,
            failing_title: failing_title.to_string(),
        }
    }
}

#[async_trait]
impl PersistenceGateway for FailingStore {
    async fn find_by_fingerprint(
        &self,
        kind: FingerprintKind,
        key: &str,
    ) -> shelf_common::Result<Option<CollectableRecord>> {
        self.inner.find_by_fingerprint(kind, key).await
    }

    async fn find_candidates(
        &self,
        kind: ShelfKind,
        title: &str,
        limit: usize,
    ) -> shelf_common::Result<Vec<CollectableRecord>> {
        self.inner.find_candidates(kind, title, limit).await
    }

    async fn upsert(&self, fields: CollectableFields) -> shelf_common::Result<UpsertOutcome> {
        if fields.title == self.failing_title {
            return Err(shelf_common::Error::Internal("disk full".to_string()));
        }
        self.inner.upsert(fields).await
    }

    async fn add_fuzzy_fingerprint(&self, collectable_id: Uuid, key: &str) -> shelf_common::Result<bool> {
        self.inner.add_fuzzy_fingerprint(collectable_id, key).await
    }

    async fn attach_to_shelf(
        &self,
        user_id: Uuid,
        shelf_id: Uuid,
        collectable_id: Uuid,
    ) -> shelf_common::Result<ShelfItem> {
        self.inner.attach_to_shelf(user_id, shelf_id, collectable_id).await
    }
}

pub fn dune_candidate() -> CatalogCandidate {
    CatalogCandidate::new("canned", "Dune")
        .with_creator("Frank Herbert")
        .with_release_date("1965-08-01")
        .with_identifier("isbn", "9780441013593")
}

/// Fully wired orchestrator over in-memory SQLite
pub struct Harness {
    pub pool: SqlitePool,
    pub store: SqliteCatalogStore,
    pub review_queue: SqliteReviewQueue,
    pub catalog: Arc<CannedCatalog>,
    pub enrichment: Arc<TableEnrichment>,
    pub jobs: JobTracker,
    pub event_bus: EventBus,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub reviews: ReviewService,
}

impl Harness {
    pub async fn new(
        extraction: ScriptedExtraction,
        catalog: CannedCatalog,
        enrichment: TableEnrichment,
    ) -> Self {
        Self::with_pool(memory_pool().await, extraction, catalog, enrichment).await
    }

    pub async fn with_pool(
        pool: SqlitePool,
        extraction: ScriptedExtraction,
        catalog: CannedCatalog,
        enrichment: TableEnrichment,
    ) -> Self {
        Self::build(pool, extraction, catalog, enrichment, None)
    }

    /// Harness whose pipeline and reviews write through a [`FailingStore`]
    pub async fn with_failing_upsert(
        extraction: ScriptedExtraction,
        catalog: CannedCatalog,
        enrichment: TableEnrichment,
        failing_title: &str,
    ) -> Self {
        Self::build(
            memory_pool().await,
            extraction,
            catalog,
            enrichment,
            Some(failing_title),
        )
    }

    fn build(
        pool: SqlitePool,
        extraction: ScriptedExtraction,
        catalog: CannedCatalog,
        enrichment: TableEnrichment,
        failing_title: Option<&str>,
    ) -> Self {
        let store = SqliteCatalogStore::new(pool.clone());
        let review_queue = SqliteReviewQueue::new(pool.clone());
        let catalog = Arc::new(catalog);
        let enrichment = Arc::new(enrichment);

        let settings = AdapterSettings {
            requests_per_second: 100,
            concurrency: 3,
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let chain = CatalogChain::new(vec![Arc::new(ProviderAdapter::new(
            catalog.clone() as Arc<dyn CatalogProvider>,
            settings,
        ))]);

        let store_gateway: Arc<dyn PersistenceGateway> = match failing_title {
            Some(title) => Arc::new(FailingStore::new(store.clone(), title)),
            None => Arc::new(store.clone()),
        };
        let review_gateway: Arc<dyn ReviewQueueGateway> = Arc::new(review_queue.clone());
        let matching = MatchingService::new(store_gateway.clone(), chain.clone(), 0.88);
        let jobs = JobTracker::default();
        let event_bus = EventBus::new(64);

        let orchestrator = Arc::new(ScanOrchestrator::new(ScanServices {
            extraction: Arc::new(extraction),
            router: ConfidenceRouter::new(ConfidenceThresholds::default()),
            matching: matching.clone(),
            chain,
            enrichment: EnrichmentService::new(enrichment.clone() as Arc<dyn EnrichmentProvider>),
            store: store_gateway.clone(),
            review_queue: review_gateway.clone(),
            jobs: jobs.clone(),
            event_bus: event_bus.clone(),
        }));
        let reviews = ReviewService::new(review_gateway, store_gateway, matching);

        Self {
            pool,
            store,
            review_queue,
            catalog,
            enrichment,
            jobs,
            event_bus,
            orchestrator,
            reviews,
        }
    }
}
