//! Catalog resolution chain
//!
//! Ordered list of provider adapters. A lookup is owned by the first adapter
//! whose provider supports the item's shelf kind; results from different
//! providers are never merged.

use std::sync::Arc;

use super::{CatalogLookup, CatalogMatches, ProviderAdapter};
use crate::models::{DetectedItem, ShelfKind};

#[derive(Clone, Default)]
pub struct CatalogChain {
    adapters: Vec<Arc<ProviderAdapter>>,
}

impl CatalogChain {
    pub fn new(adapters: Vec<Arc<ProviderAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Provider names in dispatch order
    pub fn provider_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// First adapter declaring support for `kind`
    pub fn adapter_for(&self, kind: ShelfKind) -> Option<&Arc<ProviderAdapter>> {
        self.adapters.iter().find(|a| a.supports_shelf_type(kind))
    }

    /// Best candidate for one item; unresolved when no adapter supports its kind
    pub async fn resolve(&self, item: &DetectedItem) -> CatalogLookup {
        match self.adapter_for(item.kind) {
            Some(adapter) => {
                let retries = adapter.settings().max_retries;
                adapter.safe_lookup(item, retries).await
            }
            None => {
                tracing::debug!(kind = %item.kind, "No catalog provider for shelf kind");
                CatalogLookup::unresolved()
            }
        }
    }

    /// Up to `limit` candidates for one item
    pub async fn resolve_many(&self, item: &DetectedItem, limit: usize) -> CatalogMatches {
        match self.adapter_for(item.kind) {
            Some(adapter) => adapter.safe_lookup_many(item, limit).await,
            None => CatalogMatches::default(),
        }
    }

    /// Resolve a batch of items of one kind, in input order
    pub async fn resolve_batch(&self, kind: ShelfKind, items: &[DetectedItem]) -> Vec<CatalogLookup> {
        match self.adapter_for(kind) {
            Some(adapter) => adapter.lookup_batch(items).await,
            None => items.iter().map(|_| CatalogLookup::unresolved()).collect(),
        }
    }
}
