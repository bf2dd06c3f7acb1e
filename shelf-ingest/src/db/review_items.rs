//! SQLite review queue gateway
//!
//! The review relation is optional. The first "no such table" error flips
//! the queue off for the rest of the process; callers then drop review
//! items with a warning instead of failing.

use async_trait::async_trait;
use chrono::Utc;
use shelf_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{DetectedItem, ReviewItem, ReviewStatus};
use crate::services::gateways::ReviewQueueGateway;

#[derive(Clone)]
pub struct SqliteReviewQueue {
    pool: SqlitePool,
    available: Arc<AtomicBool>,
}

impl SqliteReviewQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Pending items of one user, oldest first
    pub async fn list_pending(&self, user_id: Uuid) -> Result<Vec<ReviewItem>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, user_id, shelf_id, raw, confidence, status, created_at FROM review_items \
             WHERE user_id = ? AND status = 'pending' ORDER BY created_at",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.observe(e.into()))?;

        rows.iter().map(review_from_row).collect()
    }

    /// Disable the queue when `error` reports a missing relation
    fn observe(&self, error: Error) -> Error {
        if error.is_missing_relation() && self.available.swap(false, Ordering::SeqCst) {
            tracing::warn!(error = %error, "Review queue relation missing, review queue disabled");
        }
        error
    }
}

#[async_trait]
impl ReviewQueueGateway for SqliteReviewQueue {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn enqueue(
        &self,
        user_id: Uuid,
        shelf_id: Uuid,
        raw: &DetectedItem,
    ) -> Result<Option<ReviewItem>> {
        if !self.is_available() {
            return Ok(None);
        }

        let item = ReviewItem {
            id: Uuid::new_v4(),
            user_id,
            shelf_id,
            raw: raw.clone(),
            confidence: raw.confidence,
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
        };
        let raw_json = serde_json::to_string(&item.raw)
            .map_err(|e| Error::Internal(format!("Failed to serialize review item: {}", e)))?;

        let inserted = sqlx::query(
            "INSERT INTO review_items (id, user_id, shelf_id, raw, confidence, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(user_id.to_string())
        .bind(shelf_id.to_string())
        .bind(&raw_json)
        .bind(item.confidence)
        .bind(item.status.as_str())
        .bind(item.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(Some(item)),
            Err(e) => {
                let error = self.observe(e.into());
                if error.is_missing_relation() {
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn get(&self, review_id: Uuid, user_id: Uuid) -> Result<Option<ReviewItem>> {
        let row = sqlx::query(
            "SELECT id, user_id, shelf_id, raw, confidence, status, created_at FROM review_items \
             WHERE id = ? AND user_id = ?",
        )
        .bind(review_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| self.observe(e.into()))?;

        row.as_ref().map(review_from_row).transpose()
    }

    async fn resolve(&self, review_id: Uuid, status: ReviewStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE review_items SET status = ?, resolved_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(review_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| self.observe(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn reopen(&self, review_id: Uuid, status: ReviewStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE review_items SET status = 'pending', resolved_at = NULL WHERE id = ? AND status = ?",
        )
        .bind(review_id.to_string())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| self.observe(e.into()))?;

        Ok(result.rows_affected() > 0)
    }
}

fn review_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ReviewItem> {
    let raw: String = row.get("raw");
    let raw: DetectedItem = serde_json::from_str(&raw)
        .map_err(|e| Error::Internal(format!("Failed to deserialize review item: {}", e)))?;
    let status: String = row.get("status");
    let status = ReviewStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Invalid review status: {}", status)))?;

    Ok(ReviewItem {
        id: parse_uuid(&row.get::<String, _>("id"), "review_items.id")?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"), "review_items.user_id")?,
        shelf_id: parse_uuid(&row.get::<String, _>("shelf_id"), "review_items.shelf_id")?,
        raw,
        confidence: row.get("confidence"),
        status,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::ShelfKind;

    #[tokio::test]
    async fn test_enqueue_get_resolve() {
        let queue = SqliteReviewQueue::new(memory_pool().await);
        let (user, shelf) = (Uuid::new_v4(), Uuid::new_v4());
        let raw = DetectedItem::new("???", ShelfKind::Book, 0.3);

        let item = queue.enqueue(user, shelf, &raw).await.unwrap().unwrap();
        assert_eq!(item.status, ReviewStatus::Pending);

        let loaded = queue.get(item.id, user).await.unwrap().unwrap();
        assert_eq!(loaded.raw, raw);
        assert_eq!(loaded.confidence, 0.3);
        assert!(queue.get(item.id, Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(queue.list_pending(user).await.unwrap().len(), 1);

        assert!(queue.resolve(item.id, ReviewStatus::Dismissed).await.unwrap());
        assert!(!queue.resolve(item.id, ReviewStatus::Completed).await.unwrap());
        let loaded = queue.get(item.id, user).await.unwrap().unwrap();
        assert_eq!(loaded.status, ReviewStatus::Dismissed);
        assert!(queue.list_pending(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_only_from_claimed_status() {
        let queue = SqliteReviewQueue::new(memory_pool().await);
        let user = Uuid::new_v4();
        let raw = DetectedItem::new("???", ShelfKind::Book, 0.3);
        let item = queue.enqueue(user, Uuid::new_v4(), &raw).await.unwrap().unwrap();

        assert!(!queue.reopen(item.id, ReviewStatus::Completed).await.unwrap());
        assert!(queue.resolve(item.id, ReviewStatus::Completed).await.unwrap());
        assert!(!queue.reopen(item.id, ReviewStatus::Dismissed).await.unwrap());
        assert!(queue.reopen(item.id, ReviewStatus::Completed).await.unwrap());

        let loaded = queue.get(item.id, user).await.unwrap().unwrap();
        assert_eq!(loaded.status, ReviewStatus::Pending);
        assert_eq!(queue.list_pending(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_relation_disables_queue() {
        let pool = memory_pool().await;
        sqlx::query("DROP TABLE review_items").execute(&pool).await.unwrap();
        let queue = SqliteReviewQueue::new(pool.clone());
        assert!(queue.is_available());

        let raw = DetectedItem::new("???", ShelfKind::Book, 0.3);
        let result = queue.enqueue(Uuid::new_v4(), Uuid::new_v4(), &raw).await.unwrap();
        assert!(result.is_none());
        assert!(!queue.is_available());

        // Stays off even if the table appears later
        crate::db::create_review_table(&pool).await.unwrap();
        assert!(queue
            .enqueue(Uuid::new_v4(), Uuid::new_v4(), &raw)
            .await
            .unwrap()
            .is_none());
    }
}
