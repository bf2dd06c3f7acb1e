//! Parked detections awaiting user adjudication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DetectedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Completed,
    Dismissed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Completed => "completed",
            ReviewStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "completed" => Some(ReviewStatus::Completed),
            "dismissed" => Some(ReviewStatus::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub shelf_id: Uuid,
    /// Detection as it came out of the pipeline
    pub raw: DetectedItem,
    pub confidence: f64,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

/// User corrections applied when completing a review item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewEdits {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub format: Option<String>,
}

impl ReviewEdits {
    /// Apply edits on top of the raw detection
    ///
    /// A user-edited item is treated as fully confident.
    pub fn apply(&self, raw: &DetectedItem) -> DetectedItem {
        let mut item = raw.clone();
        if let Some(title) = self.title.as_ref().filter(|t| !t.trim().is_empty()) {
            item.title = title.trim().to_string();
        }
        if let Some(creator) = &self.creator {
            item.creator = Some(creator.trim().to_string()).filter(|c| !c.is_empty());
        }
        if self.year.is_some() {
            item.hints.year = self.year;
        }
        if self.format.is_some() {
            item.hints.format = self.format.clone();
        }
        item.confidence = 1.0;
        item
    }
}
