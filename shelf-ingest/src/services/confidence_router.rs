//! Confidence router
//!
//! Partitions detections into three policy tiers using two thresholds:
//! - High: `[max, 1]` → fingerprint match, catalog chain, standard enrichment
//! - Medium: `[min, max)` → fingerprint match, uncertain enrichment
//! - Low: `[0, min)` → review queue
//!
//! A confidence exactly equal to a threshold belongs to the upper tier.

use serde::{Deserialize, Serialize};
use shelf_common::{Error, Result};

use crate::models::DetectedItem;

pub const DEFAULT_CONFIDENCE_MIN: f64 = 0.85;
pub const DEFAULT_CONFIDENCE_MAX: f64 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

/// Tier thresholds; `min <= max`, both within [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub min: f64,
    pub max: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            min: DEFAULT_CONFIDENCE_MIN,
            max: DEFAULT_CONFIDENCE_MAX,
        }
    }
}

impl ConfidenceThresholds {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let thresholds = Self { min, max };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.min) || !in_range(self.max) {
            return Err(Error::Config(format!(
                "Confidence thresholds must be within [0, 1] (min={}, max={})",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(Error::Config(format!(
                "Confidence min ({}) must not exceed max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Tier for one confidence value
    pub fn tier_of(&self, confidence: f64) -> ConfidenceTier {
        if confidence >= self.max {
            ConfidenceTier::High
        } else if confidence >= self.min {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Router output; input order is preserved within each tier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TieredItems {
    pub high: Vec<DetectedItem>,
    pub medium: Vec<DetectedItem>,
    pub low: Vec<DetectedItem>,
}

impl TieredItems {
    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stateless confidence router
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceRouter {
    thresholds: ConfidenceThresholds,
}

impl ConfidenceRouter {
    pub fn new(thresholds: ConfidenceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> ConfidenceThresholds {
        self.thresholds
    }

    pub fn tier_of(&self, confidence: f64) -> ConfidenceTier {
        self.thresholds.tier_of(confidence)
    }

    pub fn route(&self, items: Vec<DetectedItem>) -> TieredItems {
        let mut tiers = TieredItems::default();
        for item in items {
            match self.tier_of(item.confidence) {
                ConfidenceTier::High => tiers.high.push(item),
                ConfidenceTier::Medium => tiers.medium.push(item),
                ConfidenceTier::Low => tiers.low.push(item),
            }
        }

        tracing::debug!(
            high = tiers.high.len(),
            medium = tiers.medium.len(),
            low = tiers.low.len(),
            "Routed detections by confidence"
        );

        tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShelfKind;

    #[test]
    fn test_tier_boundaries() {
        let router = ConfidenceRouter::default();
        assert_eq!(router.tier_of(1.0), ConfidenceTier::High);
        assert_eq!(router.tier_of(0.92), ConfidenceTier::High);
        assert_eq!(router.tier_of(0.9199), ConfidenceTier::Medium);
        assert_eq!(router.tier_of(0.85), ConfidenceTier::Medium);
        assert_eq!(router.tier_of(0.8499), ConfidenceTier::Low);
        assert_eq!(router.tier_of(0.0), ConfidenceTier::Low);
    }

    #[test]
    fn test_route_partitions_preserving_order() {
        let router = ConfidenceRouter::default();
        let items = vec![
            DetectedItem::new("A", ShelfKind::Book, 0.95),
            DetectedItem::new("B", ShelfKind::Book, 0.3),
            DetectedItem::new("C", ShelfKind::Book, 0.88),
            DetectedItem::new("D", ShelfKind::Book, 0.99),
        ];

        let tiers = router.route(items);
        let titles = |v: &[DetectedItem]| v.iter().map(|i| i.title.clone()).collect::<Vec<_>>();
        assert_eq!(titles(&tiers.high), vec!["A", "D"]);
        assert_eq!(titles(&tiers.medium), vec!["C"]);
        assert_eq!(titles(&tiers.low), vec!["B"]);
        assert_eq!(tiers.len(), 4);
    }

    #[test]
    fn test_equal_thresholds_leave_medium_empty() {
        let router = ConfidenceRouter::new(ConfidenceThresholds::new(0.9, 0.9).unwrap());
        assert_eq!(router.tier_of(0.9), ConfidenceTier::High);
        assert_eq!(router.tier_of(0.8999), ConfidenceTier::Low);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(ConfidenceThresholds::new(0.95, 0.9).is_err());
        assert!(ConfidenceThresholds::new(-0.1, 0.9).is_err());
        assert!(ConfidenceThresholds::new(0.5, 1.5).is_err());
    }
}
