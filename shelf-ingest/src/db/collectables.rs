//! SQLite persistence gateway
//!
//! Upserts are idempotent: the strong key is checked first, then the
//! lightweight key. An existing record is never rewritten, only appended to
//! (fuzzy keys, a strong key it did not have yet). A UNIQUE violation on
//! insert means a concurrent run created the record first; the insert then
//! turns into a reuse.

use async_trait::async_trait;
use chrono::Utc;
use shelf_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{
    CollectableFields, CollectableRecord, Fingerprints, Provenance, RecordSource, ShelfItem,
    ShelfKind,
};
use crate::services::catalog::ranking::match_key;
use crate::services::fingerprint::FingerprintKind;
use crate::services::gateways::{PersistenceGateway, UpsertOutcome};
use crate::utils::{retry_with_backoff, BackoffPolicy};

const RECORD_COLUMNS: &str = "id, title, creators, kind, year, format, identifiers, images, \
    strong_fingerprint, lightweight_fingerprint, provenance_source, provenance_provider, \
    provenance_confidence, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
    lock_retry: BackoffPolicy,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            lock_retry: BackoffPolicy {
                max_retries: 5,
                initial_backoff: std::time::Duration::from_millis(10),
                max_backoff: std::time::Duration::from_secs(1),
            },
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored collectables
    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM collectables")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CollectableRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM collectables WHERE id = ?", RECORD_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    /// Collectables on one shelf, oldest placement first
    pub async fn shelf_contents(&self, user_id: Uuid, shelf_id: Uuid) -> Result<Vec<CollectableRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM collectables c JOIN shelf_items s ON s.collectable_id = c.id \
             WHERE s.user_id = ? AND s.shelf_id = ? ORDER BY s.created_at, c.title",
            prefixed_columns("c")
        ))
        .bind(user_id.to_string())
        .bind(shelf_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    async fn find_existing(&self, fields: &CollectableFields) -> Result<Option<CollectableRecord>> {
        if let Some(strong) = &fields.fingerprints.strong {
            if let Some(record) = self.find_by_fingerprint(FingerprintKind::Strong, strong).await? {
                return Ok(Some(record));
            }
        }
        self.find_by_fingerprint(FingerprintKind::Lightweight, &fields.fingerprints.lightweight)
            .await
    }

    /// Append fuzzy keys and a missing strong key to an existing record
    async fn append_to(&self, mut record: CollectableRecord, fields: &CollectableFields) -> Result<CollectableRecord> {
        let now = Utc::now().to_rfc3339();

        if record.fingerprints.strong.is_none() {
            if let Some(strong) = &fields.fingerprints.strong {
                // OR IGNORE: another record may already own this strong key
                let updated = sqlx::query(
                    "UPDATE OR IGNORE collectables SET strong_fingerprint = ?, updated_at = ? \
                     WHERE id = ? AND strong_fingerprint IS NULL",
                )
                .bind(strong)
                .bind(&now)
                .bind(record.id.to_string())
                .execute(&self.pool)
                .await?;
                if updated.rows_affected() > 0 {
                    record.fingerprints.strong = Some(strong.clone());
                }
            }
        }

        for key in &fields.fingerprints.fuzzy_ocr {
            if self.add_fuzzy_fingerprint(record.id, key).await? {
                record.fingerprints.add_fuzzy(key.clone());
            }
        }
        Ok(record)
    }

    async fn insert(&self, fields: &CollectableFields) -> Result<CollectableRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let creators = to_json(&fields.creators)?;
        let identifiers = to_json(&fields.identifiers)?;
        let images = to_json(&fields.images)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO collectables ({}, title_key) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            RECORD_COLUMNS
        ))
        .bind(id.to_string())
        .bind(&fields.title)
        .bind(&creators)
        .bind(fields.kind.as_str())
        .bind(fields.year)
        .bind(&fields.format)
        .bind(&identifiers)
        .bind(&images)
        .bind(&fields.fingerprints.strong)
        .bind(&fields.fingerprints.lightweight)
        .bind(fields.provenance.source.as_str())
        .bind(&fields.provenance.provider)
        .bind(fields.provenance.confidence)
        .bind(&now_str)
        .bind(&now_str)
        .bind(match_key(&fields.title))
        .execute(&mut *tx)
        .await?;

        let mut fingerprints = fields.fingerprints.clone();
        fingerprints.fuzzy_ocr.clear();
        for key in &fields.fingerprints.fuzzy_ocr {
            if fingerprints.add_fuzzy(key.clone()) {
                sqlx::query(
                    "INSERT OR IGNORE INTO collectable_fuzzy_fingerprints (collectable_id, fingerprint, created_at) VALUES (?, ?, ?)",
                )
                .bind(id.to_string())
                .bind(key)
                .bind(&now_str)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        Ok(CollectableRecord {
            id,
            title: fields.title.clone(),
            creators: fields.creators.clone(),
            kind: fields.kind,
            year: fields.year,
            format: fields.format.clone(),
            identifiers: fields.identifiers.clone(),
            images: fields.images.clone(),
            fingerprints,
            provenance: fields.provenance.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn fuzzy_keys(&self, collectable_id: Uuid) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT fingerprint FROM collectable_fuzzy_fingerprints WHERE collectable_id = ? ORDER BY created_at, fingerprint",
        )
        .bind(collectable_id.to_string())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<CollectableRecord> {
        let id = parse_uuid(&row.get::<String, _>("id"), "collectables.id")?;
        let kind: String = row.get("kind");
        let kind: ShelfKind = kind
            .parse()
            .map_err(|e: String| Error::Internal(format!("Invalid kind: {}", e)))?;
        let source: String = row.get("provenance_source");
        let source = RecordSource::parse(&source)
            .ok_or_else(|| Error::Internal(format!("Invalid provenance source: {}", source)))?;

        let creators: Vec<String> = from_json(&row.get::<String, _>("creators"), "creators")?;
        let identifiers: BTreeMap<String, String> =
            from_json(&row.get::<String, _>("identifiers"), "identifiers")?;
        let images: Vec<String> = from_json(&row.get::<String, _>("images"), "images")?;

        Ok(CollectableRecord {
            id,
            title: row.get("title"),
            creators,
            kind,
            year: row.get("year"),
            format: row.get("format"),
            identifiers,
            images,
            fingerprints: Fingerprints {
                strong: row.get("strong_fingerprint"),
                lightweight: row.get("lightweight_fingerprint"),
                fuzzy_ocr: self.fuzzy_keys(id).await?,
            },
            provenance: Provenance {
                source,
                provider: row.get("provenance_provider"),
                confidence: row.get("provenance_confidence"),
            },
            created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
            updated_at: parse_timestamp(&row.get::<String, _>("updated_at"), "updated_at")?,
        })
    }
}

#[async_trait]
impl PersistenceGateway for SqliteCatalogStore {
    async fn find_by_fingerprint(
        &self,
        kind: FingerprintKind,
        key: &str,
    ) -> Result<Option<CollectableRecord>> {
        let sql = match kind {
            FingerprintKind::Strong => {
                format!("SELECT {} FROM collectables WHERE strong_fingerprint = ?", RECORD_COLUMNS)
            }
            FingerprintKind::Lightweight => format!(
                "SELECT {} FROM collectables WHERE lightweight_fingerprint = ?",
                RECORD_COLUMNS
            ),
            FingerprintKind::FuzzyOcr => format!(
                "SELECT {} FROM collectables c JOIN collectable_fuzzy_fingerprints f ON f.collectable_id = c.id \
                 WHERE f.fingerprint = ? ORDER BY c.created_at LIMIT 1",
                prefixed_columns("c")
            ),
        };

        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_candidates(
        &self,
        kind: ShelfKind,
        title: &str,
        limit: usize,
    ) -> Result<Vec<CollectableRecord>> {
        // Prefilter only; similarity is scored by the caller
        let patterns = title_key_patterns(&match_key(title));
        let sql = if patterns.is_empty() {
            format!(
                "SELECT {} FROM collectables WHERE kind = ? ORDER BY updated_at DESC LIMIT ?",
                RECORD_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM collectables WHERE kind = ? AND ({}) ORDER BY updated_at DESC LIMIT ?",
                RECORD_COLUMNS,
                vec!["title_key LIKE ?"; patterns.len()].join(" OR ")
            )
        };

        let mut query = sqlx::query(&sql).bind(kind.as_str());
        for pattern in &patterns {
            query = query.bind(pattern);
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    async fn upsert(&self, fields: CollectableFields) -> Result<UpsertOutcome> {
        if let Some(existing) = self.find_existing(&fields).await? {
            let record = self.append_to(existing, &fields).await?;
            return Ok(UpsertOutcome {
                record,
                created: false,
            });
        }

        let inserted = retry_with_backoff(
            "collectable insert",
            &self.lock_retry,
            Error::is_lock_contention,
            || self.insert(&fields),
        )
        .await;

        match inserted {
            Ok(record) => {
                tracing::debug!(collectable_id = %record.id, title = %record.title, "Collectable created");
                Ok(UpsertOutcome {
                    record,
                    created: true,
                })
            }
            Err(e) if e.is_unique_violation() => {
                tracing::debug!(title = %fields.title, "Concurrent insert won, reusing record");
                let existing = self.find_existing(&fields).await?.ok_or(e)?;
                let record = self.append_to(existing, &fields).await?;
                Ok(UpsertOutcome {
                    record,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn add_fuzzy_fingerprint(&self, collectable_id: Uuid, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO collectable_fuzzy_fingerprints (collectable_id, fingerprint, created_at) VALUES (?, ?, ?)",
        )
        .bind(collectable_id.to_string())
        .bind(key)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn attach_to_shelf(
        &self,
        user_id: Uuid,
        shelf_id: Uuid,
        collectable_id: Uuid,
    ) -> Result<ShelfItem> {
        let candidate = ShelfItem {
            id: Uuid::new_v4(),
            user_id,
            shelf_id,
            collectable_id,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT OR IGNORE INTO shelf_items (id, user_id, shelf_id, collectable_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(candidate.id.to_string())
        .bind(user_id.to_string())
        .bind(shelf_id.to_string())
        .bind(collectable_id.to_string())
        .bind(candidate.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, created_at FROM shelf_items WHERE user_id = ? AND shelf_id = ? AND collectable_id = ?",
        )
        .bind(user_id.to_string())
        .bind(shelf_id.to_string())
        .bind(collectable_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(ShelfItem {
            id: parse_uuid(&row.get::<String, _>("id"), "shelf_items.id")?,
            created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
            ..candidate
        })
    }
}

fn prefixed_columns(alias: &str) -> String {
    RECORD_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("Failed to serialize: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(value: &str, column: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

/// Most title tokens turned into LIKE patterns
const MAX_TITLE_PATTERNS: usize = 8;

/// LIKE patterns selecting records that share a title prefix or a word
///
/// Title keys only hold alphanumerics, spaces and `&+#`, so no LIKE
/// wildcard can leak in from the title.
fn title_key_patterns(key: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    let prefix: String = key.chars().filter(|c| *c != ' ').take(3).collect();
    if !prefix.is_empty() {
        patterns.push(format!("{}%", prefix));
    }
    for token in key.split(' ').filter(|t| t.chars().count() >= 3) {
        let pattern = format!("%{}%", token);
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
        if patterns.len() >= MAX_TITLE_PATTERNS {
            break;
        }
    }
    patterns
}
