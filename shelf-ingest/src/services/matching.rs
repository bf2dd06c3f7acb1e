//! Matching service
//!
//! "Find or propose" for one detection. Strategies run in order and the
//! catalog is only consulted when nothing persisted matched:
//! 1. strong, then lightweight fingerprint
//! 2. fuzzy-OCR fingerprint
//! 3. title/creator similarity over persisted records of the same kind
//! 4. catalog chain (optional)

use serde::Serialize;
use shelf_common::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{CatalogCandidate, CollectableRecord, DetectedItem, ShelfKind};
use crate::services::catalog::ranking::match_key;
use crate::services::catalog::CatalogChain;
use crate::services::fingerprint::{self, FingerprintKind};
use crate::services::gateways::PersistenceGateway;

pub const DEFAULT_SIMILARITY_FLOOR: f64 = 0.88;

/// Records fetched per similarity search
const SIMILARITY_POOL_SIZE: usize = 200;

/// Which strategy produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchSource {
    Fingerprint,
    Fuzzy,
    Similarity,
    CatalogMatch,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Fingerprint => "fingerprint",
            MatchSource::Fuzzy => "fuzzy",
            MatchSource::Similarity => "similarity",
            MatchSource::CatalogMatch => "catalog-match",
        }
    }

    /// Whether the match points at a persisted record
    pub fn is_persisted(&self) -> bool {
        !matches!(self, MatchSource::CatalogMatch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchTarget {
    Record(CollectableRecord),
    Candidate(CatalogCandidate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSuggestion {
    pub source: MatchSource,
    pub score: f64,
    pub target: MatchTarget,
}

impl MatchSuggestion {
    pub fn record(&self) -> Option<&CollectableRecord> {
        match &self.target {
            MatchTarget::Record(record) => Some(record),
            MatchTarget::Candidate(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub include_api: bool,
    /// Maximum suggestions returned
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            include_api: false,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub suggestions: Vec<MatchSuggestion>,
    /// Strategies that were actually run, in order
    pub searched: Vec<MatchSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Outcome of [`MatchingService::find_best_match`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestMatch {
    pub suggestion: Option<MatchSuggestion>,
    /// Catalog warning, when the chain was consulted and could not answer
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct MatchingService {
    store: Arc<dyn PersistenceGateway>,
    chain: CatalogChain,
    similarity_floor: f64,
}

impl MatchingService {
    pub fn new(store: Arc<dyn PersistenceGateway>, chain: CatalogChain, similarity_floor: f64) -> Self {
        Self {
            store,
            chain,
            similarity_floor: similarity_floor.clamp(0.0, 1.0),
        }
    }

    pub fn similarity_floor(&self) -> f64 {
        self.similarity_floor
    }

    /// Every persisted match, falling back to catalog candidates when none exists
    ///
    /// `kind` overrides the detection's own kind (the target shelf decides).
    pub async fn search(
        &self,
        item: &DetectedItem,
        kind: ShelfKind,
        options: SearchOptions,
    ) -> Result<SearchResult> {
        let item = with_kind(item, kind);
        let mut result = SearchResult::default();
        let mut seen: HashSet<uuid::Uuid> = HashSet::new();
        let mut push = |result: &mut SearchResult, suggestion: MatchSuggestion| {
            if let Some(record) = suggestion.record() {
                if !seen.insert(record.id) {
                    return;
                }
            }
            result.suggestions.push(suggestion);
        };

        result.searched.push(MatchSource::Fingerprint);
        if let Some(s) = self.fingerprint_match(&item).await? {
            push(&mut result, s);
        }

        result.searched.push(MatchSource::Fuzzy);
        if let Some(s) = self.fuzzy_match(&item).await? {
            push(&mut result, s);
        }

        result.searched.push(MatchSource::Similarity);
        for s in self.similarity_matches(&item).await? {
            push(&mut result, s);
        }

        if result.suggestions.is_empty() && options.include_api {
            result.searched.push(MatchSource::CatalogMatch);
            let matches = self.chain.resolve_many(&item, options.limit).await;
            result.warning = matches.warning;
            for candidate in matches.candidates {
                push(
                    &mut result,
                    MatchSuggestion {
                        source: MatchSource::CatalogMatch,
                        score: candidate.match_score,
                        target: MatchTarget::Candidate(candidate),
                    },
                );
            }
        }

        result.suggestions.truncate(options.limit);
        Ok(result)
    }

    /// First hit in strategy order; later strategies are not run
    pub async fn find_best_match(&self, item: &DetectedItem, include_api: bool) -> Result<BestMatch> {
        if let Some(s) = self.fingerprint_match(item).await? {
            return Ok(found(s));
        }
        if let Some(s) = self.fuzzy_match(item).await? {
            return Ok(found(s));
        }
        if let Some(s) = self.similarity_matches(item).await?.into_iter().next() {
            return Ok(found(s));
        }
        if !include_api {
            return Ok(BestMatch::default());
        }

        let lookup = self.chain.resolve(item).await;
        Ok(BestMatch {
            suggestion: lookup.candidate.map(|candidate| MatchSuggestion {
                source: MatchSource::CatalogMatch,
                score: candidate.match_score,
                target: MatchTarget::Candidate(candidate),
            }),
            warning: lookup.warning,
        })
    }

    async fn fingerprint_match(&self, item: &DetectedItem) -> Result<Option<MatchSuggestion>> {
        if let Some(strong) = fingerprint::strong_for(item) {
            if let Some(record) = self
                .store
                .find_by_fingerprint(FingerprintKind::Strong, &strong)
                .await?
            {
                return Ok(Some(persisted(MatchSource::Fingerprint, 1.0, record)));
            }
        }

        let lightweight = fingerprint::lightweight_for(item);
        Ok(self
            .store
            .find_by_fingerprint(FingerprintKind::Lightweight, &lightweight)
            .await?
            .map(|record| persisted(MatchSource::Fingerprint, 1.0, record)))
    }

    async fn fuzzy_match(&self, item: &DetectedItem) -> Result<Option<MatchSuggestion>> {
        let key = fingerprint::fuzzy_for(item);
        Ok(self
            .store
            .find_by_fingerprint(FingerprintKind::FuzzyOcr, &key)
            .await?
            .map(|record| persisted(MatchSource::Fuzzy, 0.95, record)))
    }

    /// Records above the similarity floor, best first
    async fn similarity_matches(&self, item: &DetectedItem) -> Result<Vec<MatchSuggestion>> {
        let pool = self
            .store
            .find_candidates(item.kind, &item.title, SIMILARITY_POOL_SIZE)
            .await?;

        let mut scored: Vec<MatchSuggestion> = pool
            .into_iter()
            .filter_map(|record| {
                let score = similarity(item, &record);
                (score >= self.similarity_floor)
                    .then(|| persisted(MatchSource::Similarity, score, record))
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::debug!(
            title = %item.title,
            matches = scored.len(),
            floor = self.similarity_floor,
            "Similarity search finished"
        );
        Ok(scored)
    }
}

fn found(suggestion: MatchSuggestion) -> BestMatch {
    BestMatch {
        suggestion: Some(suggestion),
        warning: None,
    }
}

fn persisted(source: MatchSource, score: f64, record: CollectableRecord) -> MatchSuggestion {
    MatchSuggestion {
        source,
        score,
        target: MatchTarget::Record(record),
    }
}

fn with_kind(item: &DetectedItem, kind: ShelfKind) -> DetectedItem {
    let mut item = item.clone();
    item.kind = kind;
    item
}

/// Title similarity, weighted with creator similarity when both sides have one
fn similarity(item: &DetectedItem, record: &CollectableRecord) -> f64 {
    let title = strsim::jaro_winkler(&match_key(&item.title), &match_key(&record.title));
    match (item.creator(), record.primary_creator()) {
        (Some(a), Some(b)) => {
            let creator = strsim::jaro_winkler(&match_key(a), &match_key(b));
            0.8 * title + 0.2 * creator
        }
        _ => title,
    }
}
