//! Normalized catalog provider results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Edition class of a catalog entry
///
/// `Original` outranks every derived edition when titles tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditionMarker {
    Original,
    Remaster,
    Remake,
    Port,
    Expansion,
    Compilation,
}

impl EditionMarker {
    /// Map a provider's explicit category label to a marker
    pub fn from_category(category: &str) -> Option<Self> {
        match category.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "main_game" | "main" | "original" | "album" | "work" | "edition" | "book" => {
                Some(EditionMarker::Original)
            }
            "remaster" | "remastered" => Some(EditionMarker::Remaster),
            "remake" => Some(EditionMarker::Remake),
            "port" => Some(EditionMarker::Port),
            "dlc" | "dlc_addon" | "expansion" | "standalone_expansion" | "mod" => {
                Some(EditionMarker::Expansion)
            }
            "compilation" | "bundle" | "pack" => Some(EditionMarker::Compilation),
            _ => None,
        }
    }
}

/// One result returned from a catalog provider lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCandidate {
    /// Provider name that produced this candidate
    pub provider: String,

    pub title: String,

    #[serde(default)]
    pub creator: Option<String>,

    /// Earliest known release date (YYYY, YYYY-MM or YYYY-MM-DD)
    #[serde(default)]
    pub release_date: Option<String>,

    #[serde(default)]
    pub format: Option<String>,

    /// Provider identifiers, e.g. {"openlibrary": "OL123W", "isbn": "..."}
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,

    #[serde(default)]
    pub images: Vec<String>,

    /// Explicit category label reported by the provider, if any
    #[serde(default)]
    pub category: Option<String>,

    /// Titles of entries this one is derived from (parent game, original album...)
    #[serde(default)]
    pub related_titles: Vec<String>,

    /// Resolved edition class (filled in by the adapter ranking)
    #[serde(default)]
    pub edition: Option<EditionMarker>,

    /// Ranking score used to break ties between results of one provider
    #[serde(default)]
    pub match_score: f64,
}

impl CatalogCandidate {
    pub fn new(provider: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            title: title.into(),
            creator: None,
            release_date: None,
            format: None,
            identifiers: BTreeMap::new(),
            images: Vec::new(),
            category: None,
            related_titles: Vec::new(),
            edition: None,
            match_score: 0.0,
        }
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_release_date(mut self, date: impl Into<String>) -> Self {
        self.release_date = Some(date.into());
        self
    }

    pub fn with_identifier(mut self, scheme: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(scheme.into(), value.into());
        self
    }

    /// Release year parsed from the leading digits of `release_date`
    pub fn year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_from_release_date() {
        let candidate = CatalogCandidate::new("test", "Dune").with_release_date("1965-08-01");
        assert_eq!(candidate.year(), Some(1965));

        let undated = CatalogCandidate::new("test", "Dune");
        assert_eq!(undated.year(), None);

        let garbage = CatalogCandidate::new("test", "Dune").with_release_date("n/a");
        assert_eq!(garbage.year(), None);
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(EditionMarker::from_category("main_game"), Some(EditionMarker::Original));
        assert_eq!(EditionMarker::from_category("DLC Addon"), Some(EditionMarker::Expansion));
        assert_eq!(EditionMarker::from_category("Remake"), Some(EditionMarker::Remake));
        assert_eq!(EditionMarker::from_category("mystery"), None);
    }
}
