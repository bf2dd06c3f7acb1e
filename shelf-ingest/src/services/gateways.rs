//! Storage seams used by the resolution services
//!
//! The pipeline only talks to these traits; `crate::db` provides the SQLite
//! implementations.

use async_trait::async_trait;
use shelf_common::Result;
use uuid::Uuid;

use crate::models::{
    CollectableFields, CollectableRecord, DetectedItem, ReviewItem, ReviewStatus, ShelfItem,
    ShelfKind,
};
use crate::services::fingerprint::FingerprintKind;

/// Result of an idempotent upsert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub record: CollectableRecord,
    /// False when an existing record matched on the strong or lightweight key
    pub created: bool,
}

/// Canonical collectable storage
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Record owning `key` of the given fingerprint kind
    async fn find_by_fingerprint(
        &self,
        kind: FingerprintKind,
        key: &str,
    ) -> Result<Option<CollectableRecord>>;

    /// Candidate pool for similarity matching within one shelf kind
    ///
    /// Only records sharing a title prefix or title word with `title` are
    /// returned, newest first, at most `limit` of them.
    async fn find_candidates(
        &self,
        kind: ShelfKind,
        title: &str,
        limit: usize,
    ) -> Result<Vec<CollectableRecord>>;

    /// Insert, or return the record already owning the strong key (checked
    /// first) or the lightweight key. Existing records are only appended to.
    async fn upsert(&self, fields: CollectableFields) -> Result<UpsertOutcome>;

    /// Append a fuzzy-OCR key; false when the record already had it
    async fn add_fuzzy_fingerprint(&self, collectable_id: Uuid, key: &str) -> Result<bool>;

    /// Place a collectable on a user's shelf (idempotent)
    async fn attach_to_shelf(
        &self,
        user_id: Uuid,
        shelf_id: Uuid,
        collectable_id: Uuid,
    ) -> Result<ShelfItem>;
}

/// Queue of detections awaiting a human decision
///
/// Implementations flip [`is_available`](ReviewQueueGateway::is_available)
/// off for the rest of the process when the backing relation is missing.
#[async_trait]
pub trait ReviewQueueGateway: Send + Sync {
    fn is_available(&self) -> bool;

    /// `None` when the queue is unavailable
    async fn enqueue(
        &self,
        user_id: Uuid,
        shelf_id: Uuid,
        raw: &DetectedItem,
    ) -> Result<Option<ReviewItem>>;

    /// Review item owned by `user_id`
    async fn get(&self, review_id: Uuid, user_id: Uuid) -> Result<Option<ReviewItem>>;

    /// Move a pending item to `status`; false when it was not pending
    ///
    /// The conditional update is the claim: of two concurrent callers,
    /// exactly one sees `true`.
    async fn resolve(&self, review_id: Uuid, status: ReviewStatus) -> Result<bool>;

    /// Return a claimed item in `status` to pending; false when it was not in `status`
    async fn reopen(&self, review_id: Uuid, status: ReviewStatus) -> Result<bool>;
}
