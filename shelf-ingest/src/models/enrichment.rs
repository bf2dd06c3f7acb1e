//! Enrichment provider contract types

use serde::{Deserialize, Serialize};

use super::detected_item::clamp_confidence;
use super::ShelfKind;

/// Confidence assigned to a record the provider response could not describe
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Enrichment prompt mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    /// Confident titles that only need metadata completion
    Standard,
    /// Degraded OCR: best-effort identification, honest low confidence
    Uncertain,
}

impl EnrichmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentMode::Standard => "standard",
            EnrichmentMode::Uncertain => "uncertain",
        }
    }
}

/// Minimal tuple sent to the enrichment provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub title: String,
    #[serde(default)]
    pub creator: Option<String>,
}

/// One structured record returned for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub title: String,

    #[serde(default, alias = "primaryCreator", alias = "author", alias = "artist")]
    pub primary_creator: Option<String>,

    pub kind: ShelfKind,

    pub confidence: f64,

    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default)]
    pub format: Option<String>,

    /// Diagnostic note (set on fallback records)
    #[serde(default)]
    pub note: Option<String>,

    /// True when this record is the fallback substitute, not provider output
    #[serde(default)]
    pub degraded: bool,
}

impl EnrichedItem {
    /// Fallback record substituted when the provider response is unusable
    pub fn fallback(request: &EnrichmentRequest, kind: ShelfKind, note: impl Into<String>) -> Self {
        Self {
            title: request.title.clone(),
            primary_creator: request.creator.clone(),
            kind,
            confidence: FALLBACK_CONFIDENCE,
            year: None,
            format: None,
            note: Some(note.into()),
            degraded: true,
        }
    }

    /// Clamp confidence and drop blank creators
    pub fn sanitized(mut self) -> Self {
        self.confidence = clamp_confidence(self.confidence);
        self.primary_creator = self
            .primary_creator
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_keeps_original_title() {
        let request = EnrichmentRequest {
            title: "Dun".to_string(),
            creator: None,
        };
        let item = EnrichedItem::fallback(&request, ShelfKind::Book, "unparseable response");
        assert_eq!(item.title, "Dun");
        assert_eq!(item.confidence, FALLBACK_CONFIDENCE);
        assert!(item.degraded);
        assert_eq!(item.note.as_deref(), Some("unparseable response"));
    }

    #[test]
    fn test_accepts_camel_case_creator() {
        let item: EnrichedItem = serde_json::from_str(
            r#"{"title":"Dune","primaryCreator":"Frank Herbert","kind":"book","confidence":0.97}"#,
        )
        .unwrap();
        assert_eq!(item.primary_creator.as_deref(), Some("Frank Herbert"));
        assert!(!item.degraded);
    }
}
