//! Ranking Engine: read-only top-N over rated applications.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::ledger;

pub mod handlers;

/// One row of a ranking, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedApplicant {
    pub applicant_id: String,
    pub name: Option<String>,
    pub rating: u8,
    /// 0–5 in quarter steps, for display.
    pub stars: f64,
}

/// Top `n` rated applicants for a job. `n` below 1 is treated as 1.
///
/// Ordered by rating descending, then by application order, so equal ratings
/// always come back in the same sequence.
pub async fn top_n(
    pool: &SqlitePool,
    job_id: &str,
    n: i64,
    include_rejected: bool,
) -> Result<Vec<RankedApplicant>, sqlx::Error> {
    let rows = ledger::ranked_applicants(pool, job_id, n.max(1), include_rejected).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let rating = row.rating.clamp(0, 100) as u8;
            RankedApplicant {
                applicant_id: row.applicant_id,
                name: row.name,
                rating,
                stars: stars(rating),
            }
        })
        .collect())
}

/// Maps a 0–100 rating onto 0–5 stars in 0.25 increments.
pub fn stars(rating: u8) -> f64 {
    let quarters = (f64::from(rating.min(100)) / 100.0 * 20.0).round();
    quarters / 4.0
}
