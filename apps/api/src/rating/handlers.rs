//! Axum route handlers for applications and rating runs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::ledger;
use crate::models::application::{ApplicationRow, ApplicationStatus, RatingResult};
use crate::models::job::DEFAULT_BATCH_THRESHOLD;
use crate::rating::{RelevantApplicants, SweepSummary};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub applicant_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Storage key (S3) or relative path (local) of the resume document.
    #[serde(default)]
    pub resume_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    pub include_rejected: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RelevantQuery {
    pub m: Option<i64>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs/:job_id/applications
pub async fn handle_apply(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<ApplyRequest>,
) -> Result<(StatusCode, Json<ApplicationRow>), AppError> {
    let applicant_id = request.applicant_id.trim();
    if applicant_id.is_empty() {
        return Err(AppError::Validation(
            "applicant_id cannot be empty".to_string(),
        ));
    }
    if ledger::get_job(&state.db, &job_id).await?.is_none() {
        return Err(AppError::NotFound(format!("job {job_id} not found")));
    }

    // A duplicate must not touch the stored applicant.
    if ledger::get_application(&state.db, applicant_id, &job_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "applicant {applicant_id} already applied to job {job_id}"
        )));
    }

    ledger::upsert_applicant(
        &state.db,
        applicant_id,
        request.name.as_deref(),
        request.resume_reference.as_deref(),
    )
    .await?;

    if !ledger::add_application(&state.db, applicant_id, &job_id).await? {
        return Err(AppError::Conflict(format!(
            "applicant {applicant_id} already applied to job {job_id}"
        )));
    }

    let row = ledger::get_application(&state.db, applicant_id, &job_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("application {applicant_id}/{job_id} vanished"))?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/jobs/:job_id/applications/:applicant_id
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path((job_id, applicant_id)): Path<(String, String)>,
) -> Result<Json<ApplicationRow>, AppError> {
    let row = ledger::get_application(&state.db, &applicant_id, &job_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("no application of {applicant_id} to job {job_id}"))
        })?;
    Ok(Json(row))
}

/// PUT /api/v1/jobs/:job_id/applications/:applicant_id/status
pub async fn handle_set_application_status(
    State(state): State<AppState>,
    Path((job_id, applicant_id)): Path<(String, String)>,
    Json(request): Json<ApplicationStatusRequest>,
) -> Result<Json<ApplicationRow>, AppError> {
    let status: ApplicationStatus = request.status.parse().map_err(AppError::Validation)?;

    let updated =
        ledger::update_application_status(&state.db, &applicant_id, &job_id, status).await?;
    if updated == 0 {
        return Err(AppError::NotFound(format!(
            "no application of {applicant_id} to job {job_id}"
        )));
    }

    handle_get_application(State(state), Path((job_id, applicant_id))).await
}

/// POST /api/v1/jobs/:job_id/applications/:applicant_id/rate
pub async fn handle_rate_application(
    State(state): State<AppState>,
    Path((job_id, applicant_id)): Path<(String, String)>,
) -> Result<Json<RatingResult>, AppError> {
    let result = state.orchestrator.score_one(&applicant_id, &job_id).await?;
    Ok(Json(result))
}

/// POST /api/v1/jobs/:job_id/sweep?include_rejected=false
pub async fn handle_sweep(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<SweepQuery>,
) -> Result<Json<SweepSummary>, AppError> {
    let summary = state
        .orchestrator
        .sweep(&job_id, query.include_rejected)
        .await?;
    Ok(Json(summary))
}

/// POST /api/v1/jobs/:job_id/filter-relevant?m=5
///
/// Rates whatever is still pending on an open job, then returns the best `m`.
pub async fn handle_filter_relevant(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<RelevantQuery>,
) -> Result<Json<RelevantApplicants>, AppError> {
    let m = query.m.unwrap_or(i64::from(DEFAULT_BATCH_THRESHOLD));
    let relevant = state.orchestrator.filter_relevant(&job_id, m).await?;
    Ok(Json(relevant))
}
