//! Review adjudication
//!
//! Completing a review item re-runs the user-edited detection through the
//! matching service (catalog included) and attaches the result to the shelf
//! the item was scanned from.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CollectableRecord, ReviewEdits, ReviewItem, ReviewStatus};
use crate::services::gateways::{PersistenceGateway, ReviewQueueGateway};
use crate::services::matching::{MatchSource, MatchTarget, MatchingService};
use crate::services::record_builder;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Review queue is unavailable")]
    Unavailable,

    #[error("Review item not found: {0}")]
    NotFound(Uuid),

    #[error("Review item already {0}")]
    AlreadyResolved(&'static str),

    #[error(transparent)]
    Storage(#[from] shelf_common::Error),
}

/// Result of completing a review item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOutcome {
    pub review_id: Uuid,
    pub collectable: CollectableRecord,
    /// Strategy that found the record; `None` when created from the edits alone
    pub matched_by: Option<MatchSource>,
}

#[derive(Clone)]
pub struct ReviewService {
    queue: Arc<dyn ReviewQueueGateway>,
    store: Arc<dyn PersistenceGateway>,
    matching: MatchingService,
}

impl ReviewService {
    pub fn new(
        queue: Arc<dyn ReviewQueueGateway>,
        store: Arc<dyn PersistenceGateway>,
        matching: MatchingService,
    ) -> Self {
        Self {
            queue,
            store,
            matching,
        }
    }

    pub fn is_available(&self) -> bool {
        self.queue.is_available()
    }

    pub async fn get(&self, review_id: Uuid, user_id: Uuid) -> Result<ReviewItem, ReviewError> {
        if !self.queue.is_available() {
            return Err(ReviewError::Unavailable);
        }
        self.queue
            .get(review_id, user_id)
            .await?
            .ok_or(ReviewError::NotFound(review_id))
    }

    /// Apply `edits`, resolve the item and attach the record to its shelf
    ///
    /// The item is claimed before anything is written, so of two concurrent
    /// completions only one persists. A failed write hands the claim back.
    pub async fn complete(
        &self,
        review_id: Uuid,
        user_id: Uuid,
        edits: &ReviewEdits,
    ) -> Result<ReviewOutcome, ReviewError> {
        let review = self.pending(review_id, user_id).await?;
        if !self.queue.resolve(review_id, ReviewStatus::Completed).await? {
            return Err(ReviewError::AlreadyResolved("resolved"));
        }

        let (collectable, matched_by) = match self.apply_edits(&review, user_id, edits).await {
            Ok(applied) => applied,
            Err(e) => {
                if let Err(reopen_error) = self.queue.reopen(review_id, ReviewStatus::Completed).await {
                    tracing::error!(
                        review_id = %review_id,
                        error = %reopen_error,
                        "Failed to return review item to pending"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            review_id = %review_id,
            collectable_id = %collectable.id,
            matched_by = matched_by.map(|s| s.as_str()).unwrap_or("edits"),
            "Review item completed"
        );
        Ok(ReviewOutcome {
            review_id,
            collectable,
            matched_by,
        })
    }

    /// Resolve the edited detection to a record on the item's shelf
    ///
    /// Missing record fields fall back to the user's edits; the raw OCR text
    /// only contributes its fuzzy key.
    async fn apply_edits(
        &self,
        review: &ReviewItem,
        user_id: Uuid,
        edits: &ReviewEdits,
    ) -> Result<(CollectableRecord, Option<MatchSource>), ReviewError> {
        let kind = review.raw.kind;
        let edited = edits.apply(&review.raw);

        let best = self.matching.find_best_match(&edited, true).await?;
        if let Some(warning) = &best.warning {
            tracing::warn!(review_id = %review.id, warning = %warning, "Catalog unavailable during review");
        }

        let applied = match best.suggestion {
            Some(suggestion) => match suggestion.target {
                MatchTarget::Record(record) => {
                    record_builder::attach_existing(
                        &self.store,
                        user_id,
                        review.shelf_id,
                        &record,
                        &review.raw,
                    )
                    .await?;
                    (record, Some(suggestion.source))
                }
                MatchTarget::Candidate(candidate) => {
                    let fields =
                        record_builder::from_reviewed_candidate(&review.raw, &edited, kind, &candidate);
                    let record =
                        record_builder::persist_and_attach(&self.store, user_id, review.shelf_id, fields)
                            .await?;
                    (record, Some(suggestion.source))
                }
            },
            None => {
                let fields = record_builder::from_review(&review.raw, &edited, kind);
                let record =
                    record_builder::persist_and_attach(&self.store, user_id, review.shelf_id, fields)
                        .await?;
                (record, None)
            }
        };
        Ok(applied)
    }

    pub async fn dismiss(&self, review_id: Uuid, user_id: Uuid) -> Result<(), ReviewError> {
        self.pending(review_id, user_id).await?;
        if !self.queue.resolve(review_id, ReviewStatus::Dismissed).await? {
            return Err(ReviewError::AlreadyResolved("resolved"));
        }
        tracing::info!(review_id = %review_id, "Review item dismissed");
        Ok(())
    }

    async fn pending(&self, review_id: Uuid, user_id: Uuid) -> Result<ReviewItem, ReviewError> {
        let review = self.get(review_id, user_id).await?;
        match review.status {
            ReviewStatus::Pending => Ok(review),
            other => Err(ReviewError::AlreadyResolved(other.as_str())),
        }
    }
}
