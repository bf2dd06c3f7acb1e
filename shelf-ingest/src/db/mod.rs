//! SQLite storage for collectables, shelf placements and the review queue

pub mod collectables;
pub mod review_items;

pub use collectables::SqliteCatalogStore;
pub use review_items::SqliteReviewQueue;

use shelf_common::Result;
use crate::services::catalog::ranking::match_key;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Open (creating if needed) the database at `db_path` and ensure the schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_catalog_tables(pool).await?;
    create_review_table(pool).await?;
    Ok(())
}

/// Collectables, their fuzzy keys and shelf placements
///
/// The unique indexes on the strong and lightweight keys enforce the
/// dedup invariant at the storage layer.
pub async fn create_catalog_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collectables (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            creators TEXT NOT NULL DEFAULT '[]',
            kind TEXT NOT NULL,
            year INTEGER,
            format TEXT,
            identifiers TEXT NOT NULL DEFAULT '{}',
            images TEXT NOT NULL DEFAULT '[]',
            strong_fingerprint TEXT,
            lightweight_fingerprint TEXT NOT NULL,
            provenance_source TEXT NOT NULL,
            provenance_provider TEXT,
            provenance_confidence REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            title_key TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    migrate_title_key(pool).await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_collectables_strong ON collectables(strong_fingerprint) WHERE strong_fingerprint IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_collectables_lightweight ON collectables(lightweight_fingerprint)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_collectables_kind ON collectables(kind, updated_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collectable_fuzzy_fingerprints (
            collectable_id TEXT NOT NULL REFERENCES collectables(id) ON DELETE CASCADE,
            fingerprint TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (collectable_id, fingerprint)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fuzzy_fingerprint ON collectable_fuzzy_fingerprints(fingerprint)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shelf_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            shelf_id TEXT NOT NULL,
            collectable_id TEXT NOT NULL REFERENCES collectables(id),
            created_at TEXT NOT NULL,
            UNIQUE (user_id, shelf_id, collectable_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Add and backfill `collectables.title_key` on databases created without it
///
/// The key is the diacritic-folded title used to prefilter similarity
/// candidates.
async fn migrate_title_key(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('collectables') WHERE name = 'title_key'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        tracing::info!("Adding collectables.title_key column");
        sqlx::query("ALTER TABLE collectables ADD COLUMN title_key TEXT NOT NULL DEFAULT ''")
            .execute(pool)
            .await?;
    }

    let stale: Vec<(String, String)> =
        sqlx::query_as("SELECT id, title FROM collectables WHERE title_key = ''")
            .fetch_all(pool)
            .await?;
    if !stale.is_empty() {
        tracing::info!(count = stale.len(), "Backfilling collectable title keys");
    }
    for (id, title) in stale {
        sqlx::query("UPDATE collectables SET title_key = ? WHERE id = ?")
            .bind(match_key(&title))
            .bind(&id)
            .execute(pool)
            .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_collectables_title_key ON collectables(kind, title_key)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_review_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            shelf_id TEXT NOT NULL,
            raw TEXT NOT NULL,
            confidence REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_review_items_owner ON review_items(user_id, status)")
        .execute(pool)
        .await?;

    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value).map_err(|e| {
        shelf_common::Error::Internal(format!("Invalid UUID in {}: {}", column, e))
    })
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| shelf_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}
