//! Catalog resolution
//!
//! Each external catalog source implements [`CatalogProvider`]. A
//! [`ProviderAdapter`] wraps one provider with rate limiting, bounded
//! concurrency, retries and ranking; the [`CatalogChain`] dispatches a lookup
//! to the first adapter that supports the item's shelf kind.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{CatalogCandidate, ShelfKind};

pub mod adapter;
pub mod chain;
pub mod musicbrainz;
pub mod open_library;
pub mod ranking;

pub use adapter::{AdapterSettings, ProviderAdapter};
pub use chain::CatalogChain;
pub use musicbrainz::MusicBrainzProvider;
pub use open_library::OpenLibraryProvider;

/// Catalog provider errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Timeouts, rate-limit responses and 5xx answers are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::RateLimited => true,
            ProviderError::Api(status, _) => *status >= 500,
            ProviderError::Network(_) | ProviderError::Parse(_) => false,
        }
    }

    /// Map a reqwest error, keeping timeouts distinguishable
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    /// Map a non-success HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 | 503 => ProviderError::RateLimited,
            408 | 504 => ProviderError::Timeout,
            _ => ProviderError::Api(status, body),
        }
    }
}

/// Provider-agnostic search request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub title: String,
    pub creator: Option<String>,
    pub kind: ShelfKind,
    /// Platform/format filter; only set on the second pass
    pub platform: Option<String>,
    pub limit: usize,
}

/// One external catalog data source
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Provider name used in logs, identifiers and provenance
    fn name(&self) -> &str;

    /// Whether this provider owns lookups for `kind`
    fn supports_shelf_type(&self, kind: ShelfKind) -> bool;

    /// Raw search; ranking and retries are done by the adapter
    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogCandidate>, ProviderError>;
}

/// Single-result lookup outcome
///
/// `warning` is set when the provider could not be reached; the item is
/// then unresolved rather than failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogLookup {
    pub candidate: Option<CatalogCandidate>,
    pub warning: Option<String>,
}

impl CatalogLookup {
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.candidate.is_some()
    }
}

/// Multi-result lookup outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogMatches {
    pub candidates: Vec<CatalogCandidate>,
    pub warning: Option<String>,
}
