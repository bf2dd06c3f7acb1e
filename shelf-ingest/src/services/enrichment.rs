//! Enrichment contract
//!
//! The enrichment provider is an external text model that receives a batch
//! of `{title, creator?}` tuples and answers with one structured record per
//! tuple. Its output is untrusted: every entry is validated individually and
//! anything unusable is replaced by a fallback record, so one bad entry
//! never sinks the batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{EnrichedItem, EnrichmentMode, EnrichmentRequest, ShelfKind};

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Enrichment provider not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Enrichment provider error {0}: {1}")]
    Api(u16, String),

    #[error("Invalid enrichment response: {0}")]
    InvalidResponse(String),
}

/// Raw provider: one JSON value per request, unvalidated
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich_raw(
        &self,
        items: &[EnrichmentRequest],
        kind: ShelfKind,
        mode: EnrichmentMode,
    ) -> Result<Vec<serde_json::Value>, EnrichmentError>;
}

/// Shape accepted for one provider entry
#[derive(Debug, Deserialize)]
struct RawEnrichedEntry {
    title: String,
    #[serde(default, alias = "primaryCreator", alias = "author", alias = "artist")]
    primary_creator: Option<String>,
    confidence: f64,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    format: Option<String>,
}

/// Validating front of an [`EnrichmentProvider`]
#[derive(Clone)]
pub struct EnrichmentService {
    provider: Arc<dyn EnrichmentProvider>,
}

impl EnrichmentService {
    pub fn new(provider: Arc<dyn EnrichmentProvider>) -> Self {
        Self { provider }
    }

    /// Enrich a batch; the output always has exactly one record per input
    pub async fn enrich(
        &self,
        items: &[EnrichmentRequest],
        kind: ShelfKind,
        mode: EnrichmentMode,
    ) -> Vec<EnrichedItem> {
        if items.is_empty() {
            return Vec::new();
        }

        let raw = match self.provider.enrich_raw(items, kind, mode).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    mode = mode.as_str(),
                    batch = items.len(),
                    error = %e,
                    "Enrichment provider failed, using fallback records"
                );
                let note = format!("enrichment unavailable: {}", e);
                return items
                    .iter()
                    .map(|request| EnrichedItem::fallback(request, kind, note.clone()))
                    .collect();
            }
        };

        if raw.len() != items.len() {
            tracing::warn!(
                mode = mode.as_str(),
                expected = items.len(),
                received = raw.len(),
                "Enrichment response length mismatch"
            );
        }

        let mut raw = raw.into_iter();
        items
            .iter()
            .enumerate()
            .map(|(index, request)| match raw.next() {
                Some(value) => parse_entry(value, request, kind).unwrap_or_else(|reason| {
                    tracing::warn!(index, title = %request.title, reason = %reason, "Unparseable enrichment entry");
                    EnrichedItem::fallback(request, kind, format!("unparseable enrichment entry: {}", reason))
                }),
                None => EnrichedItem::fallback(request, kind, "missing enrichment entry"),
            })
            .collect()
    }
}

fn parse_entry(
    value: serde_json::Value,
    request: &EnrichmentRequest,
    kind: ShelfKind,
) -> Result<EnrichedItem, String> {
    let entry: RawEnrichedEntry = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if !entry.confidence.is_finite() {
        return Err("non-finite confidence".to_string());
    }

    let title = entry.title.trim();
    let title = if title.is_empty() {
        request.title.clone()
    } else {
        title.to_string()
    };

    Ok(EnrichedItem {
        title,
        primary_creator: entry.primary_creator,
        kind,
        confidence: entry.confidence,
        year: entry.year,
        format: entry.format,
        note: None,
        degraded: false,
    }
    .sanitized())
}

/// Request body for the HTTP enrichment endpoint
#[derive(Debug, Serialize)]
struct EnrichmentHttpRequest<'a> {
    kind: ShelfKind,
    mode: EnrichmentMode,
    items: &'a [EnrichmentRequest],
}

/// JSON-over-HTTP enrichment endpoint answering `{"items": [...]}`
pub struct HttpEnrichmentProvider {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpEnrichmentProvider {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self, EnrichmentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentProvider {
    async fn enrich_raw(
        &self,
        items: &[EnrichmentRequest],
        kind: ShelfKind,
        mode: EnrichmentMode,
    ) -> Result<Vec<serde_json::Value>, EnrichmentError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&EnrichmentHttpRequest { kind, mode, items })
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Api(status.as_u16(), body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EnrichmentError::InvalidResponse(e.to_string()))?;
        match body.get("items") {
            Some(serde_json::Value::Array(entries)) => Ok(entries.clone()),
            _ => Err(EnrichmentError::InvalidResponse(
                "missing items array".to_string(),
            )),
        }
    }
}

/// Stand-in used when no enrichment endpoint is configured
pub struct UnconfiguredEnrichment;

#[async_trait]
impl EnrichmentProvider for UnconfiguredEnrichment {
    async fn enrich_raw(
        &self,
        _items: &[EnrichmentRequest],
        _kind: ShelfKind,
        _mode: EnrichmentMode,
    ) -> Result<Vec<serde_json::Value>, EnrichmentError> {
        Err(EnrichmentError::NotConfigured)
    }
}
