//! Calibration cell operations
//!
//! The threshold resolver consumes these counts read-only; rows are
//! produced by an external audit pipeline that tallies classifications and
//! later human overrides per (tier, band). The upsert exists for that
//! pipeline and for test seeding.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::spine::threshold::CalibrationCell;
use crate::spine::types::{ConfidenceBand, SpineTier};

/// Load the full calibration curve
///
/// Rows whose tier or band no longer parses (written under a retired label)
/// are skipped with a warning rather than failing the load; the resolver
/// treats missing cells as "no evidence" and keeps the baseline.
pub async fn load_calibration_curve(pool: &SqlitePool) -> Result<Vec<CalibrationCell>> {
    let rows = sqlx::query(
        r#"
        SELECT tier, band, total, overrides
        FROM calibration_cells
        ORDER BY tier, band
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut cells = Vec::new();
    for row in rows {
        let tier_str: String = row.get("tier");
        let band_str: String = row.get("band");

        let (Some(tier), Some(band)) =
            (SpineTier::parse(&tier_str), ConfidenceBand::parse(&band_str))
        else {
            warn!(
                "Skipping calibration cell with unrecognized labels: tier={} band={}",
                tier_str, band_str
            );
            continue;
        };

        let total: i64 = row.get("total");
        let overrides: i64 = row.get("overrides");
        cells.push(CalibrationCell {
            tier,
            band,
            total: total.max(0) as u64,
            overrides: overrides.max(0) as u64,
        });
    }

    Ok(cells)
}

/// Upsert one calibration cell's counts
pub async fn upsert_calibration_cell(pool: &SqlitePool, cell: &CalibrationCell) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO calibration_cells (tier, band, total, overrides, updated_at)
        VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(tier, band) DO UPDATE SET
            total = excluded.total,
            overrides = excluded.overrides,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(cell.tier.as_str())
    .bind(cell.band.as_str())
    .bind(cell.total as i64)
    .bind(cell.overrides as i64)
    .execute(pool)
    .await?;

    Ok(())
}
