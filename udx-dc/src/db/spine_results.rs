//! Spine result history operations
//!
//! Append-only: every orchestrator run inserts a new row, nothing is ever
//! updated in place. The latest row per document is the current spine
//! opinion; older rows exist for audit and calibration.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::spine::types::SpineClassification;

/// One stored spine result, fields in their persisted string forms
#[derive(Debug, Clone)]
pub struct SpineResultRow {
    pub result_id: i64,
    pub document_id: Uuid,
    pub doc_type: String,
    pub confidence: f64,
    pub band: String,
    pub spine_tier: String,
    pub tax_year: Option<i32>,
    pub entity_type: Option<String>,
    /// JSON array of evidence items
    pub evidence: String,
    /// JSON array of penalty records
    pub penalties: String,
    pub reason: String,
    pub schema_version: i64,
}

/// Append a spine classification to the result history
pub async fn save_spine_result(
    pool: &SqlitePool,
    classification: &SpineClassification,
) -> Result<()> {
    let evidence = serde_json::to_string(&classification.evidence)?;
    let penalties = serde_json::to_string(&classification.penalties)?;

    sqlx::query(
        r#"
        INSERT INTO spine_results (
            document_id, doc_type, confidence, band, spine_tier, tax_year,
            entity_type, evidence, penalties, reason, schema_version
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(classification.document_id.to_string())
    .bind(classification.doc_type.as_str())
    .bind(classification.confidence)
    .bind(classification.band.as_str())
    .bind(classification.spine_tier.as_str())
    .bind(classification.tax_year)
    .bind(classification.entity_type.map(|e| e.as_str()))
    .bind(evidence)
    .bind(penalties)
    .bind(&classification.reason)
    .bind(classification.schema_version as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load the most recent spine result for a document
pub async fn load_latest_result(
    pool: &SqlitePool,
    document_id: Uuid,
) -> Result<Option<SpineResultRow>> {
    let row = sqlx::query(
        r#"
        SELECT result_id, document_id, doc_type, confidence, band, spine_tier,
               tax_year, entity_type, evidence, penalties, reason, schema_version
        FROM spine_results
        WHERE document_id = ?
        ORDER BY result_id DESC
        LIMIT 1
        "#,
    )
    .bind(document_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let document_id_str: String = row.get("document_id");
            Ok(Some(SpineResultRow {
                result_id: row.get("result_id"),
                document_id: Uuid::parse_str(&document_id_str)?,
                doc_type: row.get("doc_type"),
                confidence: row.get("confidence"),
                band: row.get("band"),
                spine_tier: row.get("spine_tier"),
                tax_year: row.get("tax_year"),
                entity_type: row.get("entity_type"),
                evidence: row.get("evidence"),
                penalties: row.get("penalties"),
                reason: row.get("reason"),
                schema_version: row.get("schema_version"),
            }))
        }
        None => Ok(None),
    }
}

/// Count stored results for a document
pub async fn count_results(pool: &SqlitePool, document_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM spine_results WHERE document_id = ?")
            .bind(document_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count)
}
