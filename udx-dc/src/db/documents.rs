//! Document row operations
//!
//! One row per uploaded document. Three writers touch distinct column
//! groups: intake writes the source fields, the spine stamps `ai_*`, the
//! gatekeeper stamps `gk_*`, and human confirmation stamps `confirmed_*`.
//! Readers should not interpret these columns directly; the effective
//! classification resolver owns that logic.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

/// Source fields for a new (or re-uploaded) document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub tenant_id: String,
    pub filename: String,
    pub mime_type: Option<String>,
    /// Filesystem path to the stored content, written by the upload layer
    pub content_path: Option<String>,
    pub ocr_text: Option<String>,
    pub content_hash: Option<String>,
    /// Upstream system's document type, when one was supplied at intake
    pub canonical_doc_type: Option<String>,
    /// Upstream system's document year
    pub doc_year: Option<i32>,
}

impl NewDocument {
    /// Create a new document record with a fresh id and default tenant
    pub fn new(filename: String) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            deal_id: None,
            tenant_id: "default".to_string(),
            filename,
            mime_type: None,
            content_path: None,
            ocr_text: None,
            content_hash: None,
            canonical_doc_type: None,
            doc_year: None,
        }
    }
}

/// Full document row as stored
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub document_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub tenant_id: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub content_path: Option<String>,
    pub ocr_text: Option<String>,
    pub content_hash: Option<String>,
    pub canonical_doc_type: Option<String>,
    pub doc_year: Option<i32>,
    pub confirmed_doc_type: Option<String>,
    pub confirmed_tax_year: Option<i32>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub ai_doc_type: Option<String>,
    pub ai_confidence: Option<f64>,
    pub ai_tax_year: Option<i32>,
    pub gk_doc_type: Option<String>,
    pub gk_confidence: Option<f64>,
    pub gk_tax_year: Option<i32>,
    pub gk_route: Option<String>,
    pub gk_needs_review: bool,
    pub gk_model: Option<String>,
    pub gk_prompt_version: Option<String>,
    pub gk_prompt_hash: Option<String>,
    pub gk_classified_at: Option<DateTime<Utc>>,
}

/// Gatekeeper stamp written after a classify/route decision
#[derive(Debug, Clone)]
pub struct GatekeeperStamp {
    pub doc_type: String,
    pub confidence: f64,
    pub tax_year: Option<i32>,
    pub route: String,
    pub needs_review: bool,
    pub model: String,
    pub prompt_version: String,
    pub prompt_hash: String,
    pub classified_at: DateTime<Utc>,
}

/// Save a document's source fields (upsert keyed by document id)
pub async fn save_document(pool: &SqlitePool, doc: &NewDocument) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (
            document_id, deal_id, tenant_id, filename, mime_type, content_path,
            ocr_text, content_hash, canonical_doc_type, doc_year, created_at,
            updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(document_id) DO UPDATE SET
            deal_id = excluded.deal_id,
            tenant_id = excluded.tenant_id,
            filename = excluded.filename,
            mime_type = excluded.mime_type,
            content_path = excluded.content_path,
            ocr_text = excluded.ocr_text,
            content_hash = excluded.content_hash,
            canonical_doc_type = excluded.canonical_doc_type,
            doc_year = excluded.doc_year,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(doc.document_id.to_string())
    .bind(doc.deal_id.map(|id| id.to_string()))
    .bind(&doc.tenant_id)
    .bind(&doc.filename)
    .bind(&doc.mime_type)
    .bind(&doc.content_path)
    .bind(&doc.ocr_text)
    .bind(&doc.content_hash)
    .bind(&doc.canonical_doc_type)
    .bind(doc.doc_year)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a document by id
pub async fn load_document(pool: &SqlitePool, document_id: Uuid) -> Result<Option<DocumentRow>> {
    let row = sqlx::query(
        r#"
        SELECT document_id, deal_id, tenant_id, filename, mime_type,
               content_path, ocr_text, content_hash, canonical_doc_type,
               doc_year, confirmed_doc_type, confirmed_tax_year, confirmed_at,
               ai_doc_type, ai_confidence, ai_tax_year,
               gk_doc_type, gk_confidence, gk_tax_year, gk_route,
               gk_needs_review, gk_model, gk_prompt_version, gk_prompt_hash,
               gk_classified_at
        FROM documents
        WHERE document_id = ?
        "#,
    )
    .bind(document_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_document(&row)?)),
        None => Ok(None),
    }
}

/// Load all documents attached to a deal, oldest first
pub async fn load_deal_documents(pool: &SqlitePool, deal_id: Uuid) -> Result<Vec<DocumentRow>> {
    let rows = sqlx::query(
        r#"
        SELECT document_id, deal_id, tenant_id, filename, mime_type,
               content_path, ocr_text, content_hash, canonical_doc_type,
               doc_year, confirmed_doc_type, confirmed_tax_year, confirmed_at,
               ai_doc_type, ai_confidence, ai_tax_year,
               gk_doc_type, gk_confidence, gk_tax_year, gk_route,
               gk_needs_review, gk_model, gk_prompt_version, gk_prompt_hash,
               gk_classified_at
        FROM documents
        WHERE deal_id = ?
        ORDER BY created_at, document_id
        "#,
    )
    .bind(deal_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(row_to_document(&row)?);
    }

    Ok(documents)
}

/// Stamp the spine's latest result onto the document record
pub async fn stamp_spine_result(
    pool: &SqlitePool,
    document_id: Uuid,
    doc_type: &str,
    confidence: f64,
    tax_year: Option<i32>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE documents
        SET ai_doc_type = ?, ai_confidence = ?, ai_tax_year = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE document_id = ?
        "#,
    )
    .bind(doc_type)
    .bind(confidence)
    .bind(tax_year)
    .bind(document_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Stamp a gatekeeper classify/route decision onto the document record
pub async fn stamp_gatekeeper_result(
    pool: &SqlitePool,
    document_id: Uuid,
    stamp: &GatekeeperStamp,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE documents
        SET gk_doc_type = ?, gk_confidence = ?, gk_tax_year = ?, gk_route = ?,
            gk_needs_review = ?, gk_model = ?, gk_prompt_version = ?,
            gk_prompt_hash = ?, gk_classified_at = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE document_id = ?
        "#,
    )
    .bind(&stamp.doc_type)
    .bind(stamp.confidence)
    .bind(stamp.tax_year)
    .bind(&stamp.route)
    .bind(stamp.needs_review)
    .bind(&stamp.model)
    .bind(&stamp.prompt_version)
    .bind(&stamp.prompt_hash)
    .bind(stamp.classified_at.to_rfc3339())
    .bind(document_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a human confirmation of a document's type (and optionally year)
pub async fn confirm_document(
    pool: &SqlitePool,
    document_id: Uuid,
    doc_type: &str,
    tax_year: Option<i32>,
    confirmed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE documents
        SET confirmed_doc_type = ?, confirmed_tax_year = ?, confirmed_at = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE document_id = ?
        "#,
    )
    .bind(doc_type)
    .bind(tax_year)
    .bind(confirmed_at.to_rfc3339())
    .bind(document_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_document(row: &SqliteRow) -> Result<DocumentRow> {
    let document_id_str: String = row.get("document_id");
    let document_id = Uuid::parse_str(&document_id_str)?;

    let deal_id = match row.get::<Option<String>, _>("deal_id") {
        Some(s) => Some(Uuid::parse_str(&s)?),
        None => None,
    };

    Ok(DocumentRow {
        document_id,
        deal_id,
        tenant_id: row.get("tenant_id"),
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        content_path: row.get("content_path"),
        ocr_text: row.get("ocr_text"),
        content_hash: row.get("content_hash"),
        canonical_doc_type: row.get("canonical_doc_type"),
        doc_year: row.get("doc_year"),
        confirmed_doc_type: row.get("confirmed_doc_type"),
        confirmed_tax_year: row.get("confirmed_tax_year"),
        confirmed_at: parse_timestamp(row.get("confirmed_at"))?,
        ai_doc_type: row.get("ai_doc_type"),
        ai_confidence: row.get("ai_confidence"),
        ai_tax_year: row.get("ai_tax_year"),
        gk_doc_type: row.get("gk_doc_type"),
        gk_confidence: row.get("gk_confidence"),
        gk_tax_year: row.get("gk_tax_year"),
        gk_route: row.get("gk_route"),
        gk_needs_review: row.get("gk_needs_review"),
        gk_model: row.get("gk_model"),
        gk_prompt_version: row.get("gk_prompt_version"),
        gk_prompt_hash: row.get("gk_prompt_hash"),
        gk_classified_at: parse_timestamp(row.get("gk_classified_at"))?,
    })
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(s) => {
            let parsed = DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc);
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        udx_common::db::create_documents_table(&pool)
            .await
            .expect("Failed to create documents table");
        pool
    }

    fn sample_document() -> NewDocument {
        let mut doc = NewDocument::new("2023_form_1040.pdf".to_string());
        doc.mime_type = Some("application/pdf".to_string());
        doc.ocr_text = Some("Form 1040 U.S. Individual Income Tax Return".to_string());
        doc.content_hash = Some("abc123".to_string());
        doc
    }

    #[tokio::test]
    async fn test_save_and_load_document() {
        let pool = setup_test_db().await;
        let doc = sample_document();

        save_document(&pool, &doc).await.expect("Failed to save");

        let loaded = load_document(&pool, doc.document_id)
            .await
            .expect("Failed to load")
            .expect("Document not found");

        assert_eq!(loaded.document_id, doc.document_id);
        assert_eq!(loaded.filename, "2023_form_1040.pdf");
        assert_eq!(loaded.tenant_id, "default");
        assert_eq!(loaded.ocr_text, doc.ocr_text);
        assert!(loaded.confirmed_at.is_none());
        assert!(loaded.gk_classified_at.is_none());
        assert!(!loaded.gk_needs_review);
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let pool = setup_test_db().await;
        let mut doc = sample_document();

        save_document(&pool, &doc).await.unwrap();
        doc.filename = "renamed.pdf".to_string();
        save_document(&pool, &doc).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let loaded = load_document(&pool, doc.document_id).await.unwrap().unwrap();
        assert_eq!(loaded.filename, "renamed.pdf");
    }

    #[tokio::test]
    async fn test_load_missing_document_is_none() {
        let pool = setup_test_db().await;

        let loaded = load_document(&pool, Uuid::new_v4()).await.unwrap();

        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_stamp_spine_result() {
        let pool = setup_test_db().await;
        let doc = sample_document();
        save_document(&pool, &doc).await.unwrap();

        stamp_spine_result(&pool, doc.document_id, "IRS_PERSONAL", 0.93, Some(2023))
            .await
            .expect("Failed to stamp");

        let loaded = load_document(&pool, doc.document_id).await.unwrap().unwrap();
        assert_eq!(loaded.ai_doc_type.as_deref(), Some("IRS_PERSONAL"));
        assert_eq!(loaded.ai_confidence, Some(0.93));
        assert_eq!(loaded.ai_tax_year, Some(2023));
    }

    #[tokio::test]
    async fn test_stamp_gatekeeper_result() {
        let pool = setup_test_db().await;
        let doc = sample_document();
        save_document(&pool, &doc).await.unwrap();

        let stamp = GatekeeperStamp {
            doc_type: "PERSONAL_TAX_RETURN".to_string(),
            confidence: 0.91,
            tax_year: Some(2023),
            route: "GOOGLE_DOC_AI_CORE".to_string(),
            needs_review: false,
            model: "gemini-1.5-flash".to_string(),
            prompt_version: "gk-v3".to_string(),
            prompt_hash: "deadbeef".to_string(),
            classified_at: Utc::now(),
        };
        stamp_gatekeeper_result(&pool, doc.document_id, &stamp)
            .await
            .expect("Failed to stamp");

        let loaded = load_document(&pool, doc.document_id).await.unwrap().unwrap();
        assert_eq!(loaded.gk_doc_type.as_deref(), Some("PERSONAL_TAX_RETURN"));
        assert_eq!(loaded.gk_route.as_deref(), Some("GOOGLE_DOC_AI_CORE"));
        assert!(!loaded.gk_needs_review);
        assert!(loaded.gk_classified_at.is_some());
        assert_eq!(loaded.gk_prompt_version.as_deref(), Some("gk-v3"));
    }

    #[tokio::test]
    async fn test_confirm_document() {
        let pool = setup_test_db().await;
        let doc = sample_document();
        save_document(&pool, &doc).await.unwrap();

        let when = Utc::now();
        confirm_document(&pool, doc.document_id, "IRS_PERSONAL", Some(2023), when)
            .await
            .expect("Failed to confirm");

        let loaded = load_document(&pool, doc.document_id).await.unwrap().unwrap();
        assert_eq!(loaded.confirmed_doc_type.as_deref(), Some("IRS_PERSONAL"));
        assert_eq!(loaded.confirmed_tax_year, Some(2023));
        let confirmed_at = loaded.confirmed_at.expect("confirmed_at missing");
        assert!((confirmed_at - when).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn test_load_deal_documents_filters_by_deal() {
        let pool = setup_test_db().await;
        let deal_id = Uuid::new_v4();

        let mut in_deal = sample_document();
        in_deal.deal_id = Some(deal_id);
        save_document(&pool, &in_deal).await.unwrap();

        let mut also_in_deal = NewDocument::new("balance_sheet.pdf".to_string());
        also_in_deal.deal_id = Some(deal_id);
        save_document(&pool, &also_in_deal).await.unwrap();

        let unrelated = sample_document();
        save_document(&pool, &unrelated).await.unwrap();

        let docs = load_deal_documents(&pool, deal_id).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.deal_id == Some(deal_id)));
    }
}
