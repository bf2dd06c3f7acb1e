//! Rate-limited provider adapter
//!
//! Wraps one [`CatalogProvider`] with:
//! - a sliding-window rate limiter (`requests_per_second`)
//! - a fixed number of concurrency permits (`concurrency`)
//! - bounded exponential-backoff retries for timeouts and rate-limit answers
//! - candidate ranking and the platform-filter second pass
//!
//! Both limits are per adapter instance.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::ranking::rank_candidates;
use super::{CatalogLookup, CatalogMatches, CatalogProvider, ProviderError, SearchQuery};
use crate::models::{CatalogCandidate, DetectedItem, ShelfKind};
use crate::services::rate_limiter::SlidingWindowLimiter;
use crate::utils::{retry_with_backoff, BackoffPolicy};

/// Results requested from the provider per search
const SEARCH_PAGE_SIZE: usize = 10;

/// Per-adapter limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdapterSettings {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Maximum simultaneous provider calls
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_concurrency() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl AdapterSettings {
    fn backoff(&self, max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// One catalog provider behind rate limiting, concurrency permits and retries
pub struct ProviderAdapter {
    provider: Arc<dyn CatalogProvider>,
    limiter: SlidingWindowLimiter,
    permits: Arc<Semaphore>,
    settings: AdapterSettings,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn CatalogProvider>, settings: AdapterSettings) -> Self {
        let concurrency = settings.concurrency.max(1);
        Self {
            provider,
            limiter: SlidingWindowLimiter::per_second(settings.requests_per_second),
            permits: Arc::new(Semaphore::new(concurrency)),
            settings: AdapterSettings {
                concurrency,
                ..settings
            },
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    pub fn supports_shelf_type(&self, kind: ShelfKind) -> bool {
        self.provider.supports_shelf_type(kind)
    }

    /// Best candidate for `item`, retrying transient failures up to `retries` times
    ///
    /// Never fails: an exhausted or failed lookup is unresolved with a warning.
    pub async fn safe_lookup(&self, item: &DetectedItem, retries: u32) -> CatalogLookup {
        match self.search_ranked(item, SEARCH_PAGE_SIZE, retries).await {
            Ok(ranked) => {
                let candidate = ranked.into_iter().next();
                tracing::debug!(
                    provider = self.name(),
                    title = %item.title,
                    resolved = candidate.is_some(),
                    "Catalog lookup finished"
                );
                CatalogLookup {
                    candidate,
                    warning: None,
                }
            }
            Err(e) => CatalogLookup {
                candidate: None,
                warning: Some(self.warning_for(item, &e)),
            },
        }
    }

    /// Up to `limit` ranked candidates for interactive suggestion lists
    pub async fn safe_lookup_many(&self, item: &DetectedItem, limit: usize) -> CatalogMatches {
        match self
            .search_ranked(item, limit.max(SEARCH_PAGE_SIZE), self.settings.max_retries)
            .await
        {
            Ok(mut ranked) => {
                ranked.truncate(limit);
                CatalogMatches {
                    candidates: ranked,
                    warning: None,
                }
            }
            Err(e) => CatalogMatches {
                candidates: Vec::new(),
                warning: Some(self.warning_for(item, &e)),
            },
        }
    }

    /// Look up a batch with at most `concurrency` provider calls in flight
    ///
    /// Results are returned in input order.
    pub async fn lookup_batch(&self, items: &[DetectedItem]) -> Vec<CatalogLookup> {
        let retries = self.settings.max_retries;
        let mut lookups = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            lookups.push(async move { (index, self.safe_lookup(item, retries).await) });
        }
        let mut results: Vec<(usize, CatalogLookup)> = stream::iter(lookups)
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, lookup)| lookup).collect()
    }

    fn warning_for(&self, item: &DetectedItem, error: &ProviderError) -> String {
        tracing::warn!(
            provider = self.name(),
            title = %item.title,
            error = %error,
            "Catalog lookup unresolved"
        );
        format!(
            "{}: lookup for \"{}\" unresolved ({})",
            self.name(),
            item.title,
            error
        )
    }

    /// First pass without filters; second pass with the platform/format hint
    /// only when the first returned nothing.
    async fn search_ranked(
        &self,
        item: &DetectedItem,
        limit: usize,
        retries: u32,
    ) -> Result<Vec<CatalogCandidate>, ProviderError> {
        let mut query = SearchQuery {
            title: item.title.trim().to_string(),
            creator: item.creator().map(str::to_string),
            kind: item.kind,
            platform: None,
            limit,
        };

        let mut raw = self.call(&query, retries).await?;

        let platform_hint = item
            .hints
            .platform
            .as_deref()
            .or(item.hints.format.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty());
        if raw.is_empty() {
            if let Some(platform) = platform_hint {
                tracing::debug!(
                    provider = self.name(),
                    title = %item.title,
                    platform,
                    "No results, retrying with platform filter"
                );
                query.platform = Some(platform.to_string());
                raw = self.call(&query, retries).await?;
            }
        }

        Ok(rank_candidates(item, raw))
    }

    /// One provider search under permit, rate limit and retry policy
    async fn call(
        &self,
        query: &SearchQuery,
        retries: u32,
    ) -> Result<Vec<CatalogCandidate>, ProviderError> {
        let policy = self.settings.backoff(retries);
        retry_with_backoff(
            self.provider.name(),
            &policy,
            ProviderError::is_retryable,
            || async {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| ProviderError::Network(format!("Adapter closed: {}", e)))?;
                self.limiter.acquire().await;
                self.provider.search(query).await
            },
        )
        .await
    }
}
