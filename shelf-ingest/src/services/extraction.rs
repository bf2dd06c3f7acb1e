//! Extraction adapter
//!
//! Turns a shelf photo into raw detections. The vision model itself lives
//! behind an HTTP endpoint; this module only sequences the call and
//! validates what comes back. Any failure here is fatal to the run.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{DetectedItem, ItemHints, ShelfKind};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Empty image")]
    EmptyImage,

    #[error("Extraction provider not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Extraction provider error {0}: {1}")]
    Api(u16, String),

    #[error("Invalid extraction response: {0}")]
    InvalidResponse(String),
}

/// Image to detections
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    async fn detect(&self, image: &[u8], kind: ShelfKind) -> Result<Vec<DetectedItem>, ExtractionError>;
}

/// Request body sent to the vision endpoint
#[derive(Debug, Serialize)]
struct VisionRequest<'a> {
    kind: ShelfKind,
    image_base64: &'a str,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    items: Vec<VisionItem>,
}

#[derive(Debug, Deserialize)]
struct VisionItem {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "author", alias = "artist")]
    creator: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    year: Option<i32>,
}

/// JSON-over-HTTP vision endpoint
pub struct HttpExtractionAdapter {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpExtractionAdapter {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self, ExtractionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl ExtractionAdapter for HttpExtractionAdapter {
    async fn detect(&self, image: &[u8], kind: ShelfKind) -> Result<Vec<DetectedItem>, ExtractionError> {
        if image.is_empty() {
            return Err(ExtractionError::EmptyImage);
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&VisionRequest {
                kind,
                image_base64: &encoded,
            })
            .send()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api(status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;
        parse_detections(&body, kind)
    }
}

/// Stand-in used when no vision endpoint is configured
pub struct UnconfiguredExtraction;

#[async_trait]
impl ExtractionAdapter for UnconfiguredExtraction {
    async fn detect(&self, _image: &[u8], _kind: ShelfKind) -> Result<Vec<DetectedItem>, ExtractionError> {
        Err(ExtractionError::NotConfigured)
    }
}

/// Parse a vision response; entries without a title are discarded
fn parse_detections(body: &str, kind: ShelfKind) -> Result<Vec<DetectedItem>, ExtractionError> {
    let parsed: VisionResponse =
        serde_json::from_str(body).map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

    let items: Vec<DetectedItem> = parsed
        .items
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .map(|item| {
            let mut detected = DetectedItem::new(item.title.trim(), kind, item.confidence.unwrap_or(0.0))
                .with_hints(ItemHints {
                    format: item.format,
                    platform: item.platform,
                    year: item.year,
                });
            if let Some(creator) = item.creator {
                detected = detected.with_creator(creator);
            }
            detected
        })
        .collect();

    tracing::debug!(kind = %kind, detected = items.len(), "Parsed extraction response");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detections() {
        let body = r#"{
            "items": [
                {"title": " Dune ", "author": "Frank Herbert", "confidence": 0.95, "year": 1965},
                {"title": "", "confidence": 0.9},
                {"title": "???", "confidence": 1.7}
            ]
        }"#;

        let items = parse_detections(body, ShelfKind::Book).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Dune");
        assert_eq!(items[0].creator(), Some("Frank Herbert"));
        assert_eq!(items[0].hints.year, Some(1965));
        assert_eq!(items[0].kind, ShelfKind::Book);
        // Confidence is clamped
        assert_eq!(items[1].confidence, 1.0);
    }

    #[test]
    fn test_missing_confidence_is_zero() {
        let items = parse_detections(r#"{"items":[{"title":"Ico"}]}"#, ShelfKind::Game).unwrap();
        assert_eq!(items[0].confidence, 0.0);
    }

    #[test]
    fn test_invalid_response() {
        assert!(matches!(
            parse_detections("<html>", ShelfKind::Book),
            Err(ExtractionError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_extraction_fails() {
        let result = UnconfiguredExtraction.detect(b"jpeg", ShelfKind::Book).await;
        assert!(matches!(result, Err(ExtractionError::NotConfigured)));
    }
}
