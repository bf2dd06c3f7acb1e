//! Fingerprint engine
//!
//! Three dedup keys per item, all SHA-256 over a normalized, field-tagged
//! input string:
//! - **Strong**: title + creator + kind + year + format (catalog-confirmed records)
//! - **Lightweight**: title + creator + kind (primary dedup key)
//! - **Fuzzy-OCR**: title + creator + kind from raw OCR text, with word
//!   boundaries folded away so split/joined words collide
//!
//! Normalization composes to NFC, trims, lowercases (accents preserved),
//! collapses whitespace and strips punctuation that carries no meaning.

use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::{DetectedItem, ShelfKind};

/// Field separator inside the hashed input (unit separator, stripped from text)
const FIELD_SEP: char = '\u{1f}';

/// Dedup key variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintKind {
    Strong,
    Lightweight,
    FuzzyOcr,
}

impl FingerprintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintKind::Strong => "strong",
            FingerprintKind::Lightweight => "lightweight",
            FingerprintKind::FuzzyOcr => "fuzzy",
        }
    }

    fn domain(&self) -> &'static str {
        match self {
            FingerprintKind::Strong => "strong:v1",
            FingerprintKind::Lightweight => "lightweight:v1",
            FingerprintKind::FuzzyOcr => "fuzzy:v1",
        }
    }
}

/// Normalize free text for fingerprinting
///
/// Apostrophes are dropped in place ("Ender's" → "enders"); other
/// non-semantic punctuation becomes a word break. `&`, `+` and `#` are kept
/// ("C++", "Love & Rockets"). Precomposed and decomposed spellings of the
/// same accented text normalize identically.
pub fn normalize_text(input: &str) -> String {
    let lowered: String = input.nfc().flat_map(char::to_lowercase).collect();
    let mut out = String::with_capacity(lowered.len());
    for c in lowered.nfc() {
        match c {
            '\'' | '\u{2018}' | '\u{2019}' | '`' | '\u{b4}' => {}
            '&' | '+' | '#' => out.push(c),
            c if c.is_alphanumeric() || is_combining_mark(c) => out.push(c),
            _ => out.push(' '),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tagged creator field; absent and blank creators share one stable placeholder
///
/// The placeholder can never equal a normalized creator ("null" encodes as
/// `c+null`, absence as `c-`).
fn creator_field(creator: Option<&str>) -> String {
    match creator.map(normalize_text).filter(|c| !c.is_empty()) {
        Some(c) => format!("c+{}", c),
        None => "c-".to_string(),
    }
}

fn optional_field(tag: &str, value: Option<String>) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => format!("{}+{}", tag, v),
        None => format!("{}-", tag),
    }
}

fn digest(kind: FingerprintKind, fields: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.domain().as_bytes());
    for field in fields {
        hasher.update([FIELD_SEP as u8]);
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Primary dedup key over normalized title + creator + kind
pub fn lightweight_fingerprint(title: &str, creator: Option<&str>, kind: ShelfKind) -> String {
    digest(
        FingerprintKind::Lightweight,
        &[
            format!("t+{}", normalize_text(title)),
            creator_field(creator),
            format!("k+{}", kind.as_str()),
        ],
    )
}

/// Catalog-confirmed key additionally covering year and format
pub fn strong_fingerprint(
    title: &str,
    creator: Option<&str>,
    kind: ShelfKind,
    year: Option<i32>,
    format: Option<&str>,
) -> String {
    digest(
        FingerprintKind::Strong,
        &[
            format!("t+{}", normalize_text(title)),
            creator_field(creator),
            format!("k+{}", kind.as_str()),
            optional_field("y", year.map(|y| y.to_string())),
            optional_field("f", format.map(normalize_text)),
        ],
    )
}

/// Key over raw OCR text, insensitive to word splits ("Harry Pot ter")
pub fn fuzzy_ocr_fingerprint(title: &str, creator: Option<&str>, kind: ShelfKind) -> String {
    let squash = |s: &str| normalize_text(s).replace(' ', "");
    let creator = match creator.map(squash).filter(|c| !c.is_empty()) {
        Some(c) => format!("c+{}", c),
        None => "c-".to_string(),
    };
    digest(
        FingerprintKind::FuzzyOcr,
        &[
            format!("t+{}", squash(title)),
            creator,
            format!("k+{}", kind.as_str()),
        ],
    )
}

/// Lightweight key of a detection
pub fn lightweight_for(item: &DetectedItem) -> String {
    lightweight_fingerprint(&item.title, item.creator(), item.kind)
}

/// Fuzzy-OCR key of a detection (raw, unenriched text)
pub fn fuzzy_for(item: &DetectedItem) -> String {
    fuzzy_ocr_fingerprint(&item.title, item.creator(), item.kind)
}

/// Strong key of a detection, only when it carries a year
pub fn strong_for(item: &DetectedItem) -> Option<String> {
    item.hints.year.map(|year| {
        strong_fingerprint(
            &item.title,
            item.creator(),
            item.kind,
            Some(year),
            item.hints.format.as_deref(),
        )
    })
}
