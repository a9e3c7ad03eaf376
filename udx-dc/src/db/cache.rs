//! Gatekeeper classification cache operations
//!
//! Content-addressed and tenant-scoped: the key is
//! `(tenant_id, content_hash, prompt_hash)`. Only the raw classification is
//! cached; routes are recomputed from current rules on every request.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::gatekeeper::types::GatekeeperClassification;

/// A cache hit: the stored classification plus the model that produced it
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub classification: GatekeeperClassification,
    pub model: String,
}

/// Look up a cached classification
///
/// A stored entry that no longer deserializes (e.g. written under a retired
/// classification shape) is treated as a miss, not an error.
pub async fn load_cached_classification(
    pool: &SqlitePool,
    tenant_id: &str,
    content_hash: &str,
    prompt_hash: &str,
) -> Result<Option<CacheHit>> {
    let row = sqlx::query(
        r#"
        SELECT classification, model
        FROM gatekeeper_cache
        WHERE tenant_id = ? AND content_hash = ? AND prompt_hash = ?
        "#,
    )
    .bind(tenant_id)
    .bind(content_hash)
    .bind(prompt_hash)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let json: String = row.get("classification");
            match serde_json::from_str::<GatekeeperClassification>(&json) {
                Ok(classification) => Ok(Some(CacheHit {
                    classification,
                    model: row.get("model"),
                })),
                Err(e) => {
                    warn!(
                        "Discarding undecodable cache entry for tenant {} hash {}: {}",
                        tenant_id, content_hash, e
                    );
                    Ok(None)
                }
            }
        }
        None => Ok(None),
    }
}

/// Store a classification in the cache (upsert keyed by the full triple)
pub async fn store_cached_classification(
    pool: &SqlitePool,
    tenant_id: &str,
    content_hash: &str,
    prompt_hash: &str,
    classification: &GatekeeperClassification,
    model: &str,
) -> Result<()> {
    let json = serde_json::to_string(classification)?;

    sqlx::query(
        r#"
        INSERT INTO gatekeeper_cache (tenant_id, content_hash, prompt_hash, classification, model)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, content_hash, prompt_hash) DO UPDATE SET
            classification = excluded.classification,
            model = excluded.model
        "#,
    )
    .bind(tenant_id)
    .bind(content_hash)
    .bind(prompt_hash)
    .bind(json)
    .bind(model)
    .execute(pool)
    .await?;

    Ok(())
}
