use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::ledger;
use crate::ranking::{top_n, RankedApplicant};
use crate::state::AppState;

const DEFAULT_RANKING_SIZE: i64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct RankingQuery {
    pub n: Option<i64>,
    #[serde(default)]
    pub include_rejected: bool,
}

/// GET /api/v1/jobs/:job_id/ranking?n=10&include_rejected=false
pub async fn handle_ranking(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<RankingQuery>,
) -> Result<Json<Vec<RankedApplicant>>, AppError> {
    if ledger::get_job(&state.db, &job_id).await?.is_none() {
        return Err(AppError::NotFound(format!("job {job_id} not found")));
    }

    let n = query.n.unwrap_or(DEFAULT_RANKING_SIZE);
    let ranked = top_n(&state.db, &job_id, n, query.include_rejected).await?;
    Ok(Json(ranked))
}
