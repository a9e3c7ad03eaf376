//! Database access for udx-dc
//!
//! Document rows, the append-only spine result history, the tenant-scoped
//! gatekeeper cache, calibration audit counts, and the settings table.
//! Schema creation lives in `udx_common::db::init`; the row operations here
//! are service-local.

pub mod cache;
pub mod calibration;
pub mod documents;
pub mod settings;
pub mod spine_results;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Opens (or creates) the service database and ensures all tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = udx_common::db::init_database(db_path).await?;
    Ok(pool)
}
