//! Candidate ranking inside one provider adapter
//!
//! Priority order:
//! 1. Exact title (case/diacritics-normalized) outranks partial and fuzzy matches
//! 2. Earliest known release date wins among equal title matches
//! 3. Original editions outrank derived ones (remaster, port, DLC...)
//! 4. Match score breaks any remaining tie

use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::{CatalogCandidate, DetectedItem, EditionMarker};
use crate::services::fingerprint::normalize_text;

/// Minimum Jaro-Winkler similarity for a fuzzy title match
const FUZZY_TITLE_THRESHOLD: f64 = 0.85;

/// Minimum Jaro-Winkler similarity for creators to count as agreeing
const CREATOR_AGREEMENT_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TitleMatch {
    None,
    Fuzzy,
    Partial,
    Exact,
}

/// Letters with no canonical decomposition that still fold to ASCII
fn fold_letter(c: char, out: &mut String) {
    match c {
        'ß' => out.push_str("ss"),
        'æ' => out.push_str("ae"),
        'œ' => out.push_str("oe"),
        'ø' => out.push('o'),
        'ł' => out.push('l'),
        'đ' | 'ð' => out.push('d'),
        'ı' => out.push('i'),
        other => out.push(other),
    }
}

/// Comparison key: fingerprint normalization with diacritics removed
pub fn match_key(s: &str) -> String {
    let stripped: String = s.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let mut key = String::with_capacity(stripped.len());
    for c in normalize_text(&stripped).chars() {
        fold_letter(c, &mut key);
    }
    key
}

/// Classify how well `candidate` matches `query`, with a 0-1 similarity
pub fn title_match(query: &str, candidate: &str) -> (TitleMatch, f64) {
    let q = match_key(query);
    let c = match_key(candidate);
    if q.is_empty() || c.is_empty() {
        return (TitleMatch::None, 0.0);
    }
    if q == c {
        return (TitleMatch::Exact, 1.0);
    }
    if c.contains(&q) || q.contains(&c) {
        let (short, long) = if q.len() <= c.len() { (&q, &c) } else { (&c, &q) };
        return (TitleMatch::Partial, short.len() as f64 / long.len() as f64);
    }
    let similarity = strsim::jaro_winkler(&q, &c);
    if similarity >= FUZZY_TITLE_THRESHOLD {
        (TitleMatch::Fuzzy, similarity)
    } else {
        (TitleMatch::None, similarity)
    }
}

/// Edition class of a candidate
///
/// An explicit provider category always wins. Otherwise the edition is
/// inferred from title keywords and relational fields.
pub fn infer_edition(candidate: &CatalogCandidate) -> EditionMarker {
    if let Some(marker) = candidate
        .category
        .as_deref()
        .and_then(EditionMarker::from_category)
    {
        return marker;
    }

    let title = match_key(&candidate.title);
    let has_word = |w: &str| title.split(' ').any(|t| t == w);
    if title.contains("remaster") {
        return EditionMarker::Remaster;
    }
    if has_word("remake") {
        return EditionMarker::Remake;
    }
    if has_word("dlc") || has_word("expansion") || title.contains("season pass") {
        return EditionMarker::Expansion;
    }
    if has_word("collection") || has_word("trilogy") || has_word("anthology") || title.contains("box set") {
        return EditionMarker::Compilation;
    }

    // Derived from another entry: same title elsewhere is a port, a different one an add-on
    if !candidate.related_titles.is_empty() {
        let same_work = candidate
            .related_titles
            .iter()
            .any(|related| match_key(related) == title);
        return if same_work {
            EditionMarker::Port
        } else {
            EditionMarker::Expansion
        };
    }

    EditionMarker::Original
}

fn creator_agrees(item: &DetectedItem, candidate: &CatalogCandidate) -> bool {
    match (item.creator(), candidate.creator.as_deref()) {
        (Some(a), Some(b)) => {
            strsim::jaro_winkler(&match_key(a), &match_key(b)) >= CREATOR_AGREEMENT_THRESHOLD
        }
        _ => false,
    }
}

fn score(title: TitleMatch, similarity: f64, creator_bonus: bool) -> f64 {
    let base = match title {
        TitleMatch::Exact => 0.9,
        TitleMatch::Partial => 0.5 + 0.3 * similarity,
        TitleMatch::Fuzzy => 0.5 * similarity,
        TitleMatch::None => 0.0,
    };
    let bonus = if creator_bonus { 0.1 } else { 0.0 };
    (base + bonus).min(1.0)
}

fn compare_dates(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Score, filter and order a provider's results for one detection
///
/// Candidates whose title does not match at all are dropped.
pub fn rank_candidates(
    item: &DetectedItem,
    candidates: Vec<CatalogCandidate>,
) -> Vec<CatalogCandidate> {
    let mut scored: Vec<(TitleMatch, CatalogCandidate)> = candidates
        .into_iter()
        .filter_map(|mut candidate| {
            let (title, similarity) = title_match(&item.title, &candidate.title);
            if title == TitleMatch::None {
                return None;
            }
            candidate.edition = Some(infer_edition(&candidate));
            candidate.match_score = score(title, similarity, creator_agrees(item, &candidate));
            Some((title, candidate))
        })
        .collect();

    scored.sort_by(|(ta, a), (tb, b)| {
        tb.cmp(ta)
            .then_with(|| compare_dates(a.release_date.as_deref(), b.release_date.as_deref()))
            .then_with(|| a.edition.cmp(&b.edition))
            .then_with(|| {
                b.match_score
                    .partial_cmp(&a.match_score)
                    .unwrap_or(Ordering::Equal)
            })
    });

    scored.into_iter().map(|(_, candidate)| candidate).collect()
}
