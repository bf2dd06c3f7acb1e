//! Raw extraction results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shelf type: every shelf holds a single kind of collectable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShelfKind {
    Book,
    Game,
    Movie,
    Music,
    Other,
}

impl ShelfKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShelfKind::Book => "book",
            ShelfKind::Game => "game",
            ShelfKind::Movie => "movie",
            ShelfKind::Music => "music",
            ShelfKind::Other => "other",
        }
    }
}

impl fmt::Display for ShelfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShelfKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "book" | "books" => Ok(ShelfKind::Book),
            "game" | "games" => Ok(ShelfKind::Game),
            "movie" | "movies" | "film" => Ok(ShelfKind::Movie),
            "music" | "album" | "albums" => Ok(ShelfKind::Music),
            "other" | "misc" => Ok(ShelfKind::Other),
            other => Err(format!("Unknown shelf kind: {}", other)),
        }
    }
}

/// Provider-agnostic hints read off the physical object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemHints {
    /// Physical format (e.g. "hardcover", "vinyl", "blu-ray")
    #[serde(default)]
    pub format: Option<String>,

    /// Platform for games (e.g. "ps2", "switch")
    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub year: Option<i32>,
}

/// One object detected on a shelf photo
///
/// Produced by the extraction adapter and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedItem {
    pub title: String,

    #[serde(default)]
    pub creator: Option<String>,

    pub kind: ShelfKind,

    /// Extraction confidence (0.0 - 1.0)
    pub confidence: f64,

    #[serde(default)]
    pub hints: ItemHints,
}

impl DetectedItem {
    /// Create a detection with confidence clamped into [0, 1]
    pub fn new(title: impl Into<String>, kind: ShelfKind, confidence: f64) -> Self {
        Self {
            title: title.into(),
            creator: None,
            kind,
            confidence: clamp_confidence(confidence),
            hints: ItemHints::default(),
        }
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_hints(mut self, hints: ItemHints) -> Self {
        self.hints = hints;
        self
    }

    /// Creator with blank strings treated as absent
    pub fn creator(&self) -> Option<&str> {
        self.creator
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Clamp a provider-reported confidence into [0, 1]; NaN counts as 0
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
