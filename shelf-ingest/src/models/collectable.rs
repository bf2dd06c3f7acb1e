//! Canonical catalog records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::ShelfKind;

/// Dedup keys stored on a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprints {
    /// Catalog-confirmed key (title + creator + kind + year + format)
    #[serde(default)]
    pub strong: Option<String>,

    /// Primary dedup key (title + creator + kind)
    pub lightweight: String,

    /// Keys computed from raw OCR text of past scans; a set, append-only
    #[serde(default)]
    pub fuzzy_ocr: Vec<String>,
}

impl Fingerprints {
    pub fn new(lightweight: String) -> Self {
        Self {
            strong: None,
            lightweight,
            fuzzy_ocr: Vec::new(),
        }
    }

    /// Add a fuzzy-OCR key; returns false if it was already present
    pub fn add_fuzzy(&mut self, key: String) -> bool {
        if self.fuzzy_ocr.contains(&key) {
            return false;
        }
        self.fuzzy_ocr.push(key);
        true
    }
}

/// How a record entered the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Confirmed by a catalog provider
    Catalog,
    /// Completed by the enrichment provider
    Enrichment,
    /// Created from a user-adjudicated review item
    Review,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Catalog => "catalog",
            RecordSource::Enrichment => "enrichment",
            RecordSource::Review => "review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "catalog" => Some(RecordSource::Catalog),
            "enrichment" => Some(RecordSource::Enrichment),
            "review" => Some(RecordSource::Review),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: RecordSource,

    /// Catalog provider name, when `source` is `Catalog`
    #[serde(default)]
    pub provider: Option<String>,

    /// Confidence at the time the record was created
    pub confidence: f64,
}

/// Fields supplied to `upsert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectableFields {
    pub title: String,
    #[serde(default)]
    pub creators: Vec<String>,
    pub kind: ShelfKind,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub fingerprints: Fingerprints,
    pub provenance: Provenance,
}

impl CollectableFields {
    pub fn primary_creator(&self) -> Option<&str> {
        self.creators.first().map(String::as_str)
    }
}

/// Canonical record for one real-world work, shared across users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectableRecord {
    pub id: Uuid,
    pub title: String,
    pub creators: Vec<String>,
    pub kind: ShelfKind,
    pub year: Option<i32>,
    pub format: Option<String>,
    pub identifiers: BTreeMap<String, String>,
    pub images: Vec<String>,
    pub fingerprints: Fingerprints,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectableRecord {
    pub fn primary_creator(&self) -> Option<&str> {
        self.creators.first().map(String::as_str)
    }
}

/// A collectable placed on one user's shelf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub shelf_id: Uuid,
    pub collectable_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzzy_fingerprints_are_a_set() {
        let mut fingerprints = Fingerprints::new("lw".to_string());
        assert!(fingerprints.add_fuzzy("a".to_string()));
        assert!(fingerprints.add_fuzzy("b".to_string()));
        assert!(!fingerprints.add_fuzzy("a".to_string()));
        assert_eq!(fingerprints.fuzzy_ocr, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_record_source_round_trip_strings() {
        for source in [RecordSource::Catalog, RecordSource::Enrichment, RecordSource::Review] {
            assert_eq!(RecordSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(RecordSource::parse("manual"), None);
    }
}
