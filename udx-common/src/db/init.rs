//! Database initialization
//!
//! Creates the SQLite schema on first run and opens the shared connection
//! pool. Every `create_*_table` function is idempotent (`CREATE TABLE IF NOT
//! EXISTS`) and public so service crates and their tests can initialize an
//! in-memory database with exactly the tables they need.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while one writer stamps results
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_all_tables(&pool).await?;

    Ok(pool)
}

/// Create every table the classification service uses
///
/// Idempotent; safe to call on every startup and from test setup.
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_documents_table(pool).await?;
    create_spine_results_table(pool).await?;
    create_gatekeeper_cache_table(pool).await?;
    create_calibration_cells_table(pool).await?;
    create_settings_table(pool).await?;

    info!(
        "Database tables initialized (documents, spine_results, gatekeeper_cache, \
         calibration_cells, settings)"
    );

    Ok(())
}

/// Create the documents table
///
/// One row per uploaded document. Holds the source fields (text, hashes),
/// the canonical/confirmed classification fields written by humans, the
/// AI fields written by the spine, and the `gk_*` stamp columns written by
/// the gatekeeper. Consumers must resolve these through the effective
/// classification resolver rather than reading raw columns.
pub async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            document_id TEXT PRIMARY KEY,
            deal_id TEXT,
            tenant_id TEXT NOT NULL DEFAULT 'default',
            filename TEXT NOT NULL,
            mime_type TEXT,
            content_path TEXT,
            ocr_text TEXT,
            content_hash TEXT,
            canonical_doc_type TEXT,
            doc_year INTEGER,
            confirmed_doc_type TEXT,
            confirmed_tax_year INTEGER,
            confirmed_at TIMESTAMP,
            ai_doc_type TEXT,
            ai_confidence REAL,
            ai_tax_year INTEGER,
            gk_doc_type TEXT,
            gk_confidence REAL,
            gk_tax_year INTEGER,
            gk_route TEXT,
            gk_needs_review INTEGER NOT NULL DEFAULT 0,
            gk_model TEXT,
            gk_prompt_version TEXT,
            gk_prompt_hash TEXT,
            gk_classified_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (ai_confidence IS NULL OR (ai_confidence >= 0.0 AND ai_confidence <= 1.0)),
            CHECK (gk_confidence IS NULL OR (gk_confidence >= 0.0 AND gk_confidence <= 1.0))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_deal ON documents(deal_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the spine_results table
///
/// Append-only history of spine classifications. Evidence and penalties are
/// stored as JSON arrays; `schema_version` lets readers skip rows written
/// under a retired result shape.
pub async fn create_spine_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spine_results (
            result_id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            band TEXT NOT NULL,
            spine_tier TEXT NOT NULL,
            tax_year INTEGER,
            entity_type TEXT,
            evidence TEXT NOT NULL DEFAULT '[]',
            penalties TEXT NOT NULL DEFAULT '[]',
            reason TEXT NOT NULL DEFAULT '',
            schema_version INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (confidence >= 0.0 AND confidence <= 1.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_spine_results_document ON spine_results(document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the gatekeeper_cache table
///
/// Content-addressed, tenant-scoped cache of raw gatekeeper classifications.
/// The route is never stored here: it is recomputed from current rules on
/// every request, so routing changes apply retroactively without cache
/// invalidation. A prompt change rotates `prompt_hash` and silently strands
/// stale entries.
pub async fn create_gatekeeper_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gatekeeper_cache (
            tenant_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            prompt_hash TEXT NOT NULL,
            classification TEXT NOT NULL,
            model TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (tenant_id, content_hash, prompt_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the calibration_cells table
///
/// Per (tier, band) audit counts consumed read-only by the threshold
/// resolver. Rows are produced by an external audit pipeline; this service
/// only reads them (plus test/ops seeding).
pub async fn create_calibration_cells_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calibration_cells (
            tier TEXT NOT NULL,
            band TEXT NOT NULL,
            total INTEGER NOT NULL DEFAULT 0,
            overrides INTEGER NOT NULL DEFAULT 0,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (tier, band),
            CHECK (total >= 0),
            CHECK (overrides >= 0 AND overrides <= total)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
