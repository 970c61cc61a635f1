//! Axum route handlers for jobs and their analysis policies.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::models::job::{AnalysisPolicy, Job, PolicyKind};
use crate::policy::{JobDraft, PolicyError, PolicyInput};
use crate::rating::jd_parser::structure_job_description;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpsertJobRequest {
    pub job_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub policy: Option<PolicyInput>,
}

#[derive(Debug, Serialize)]
pub struct UpsertJobResponse {
    pub job: Job,
    pub structured: bool,
    /// Set when the description could not be structured. The job is saved
    /// anyway but cannot be rated until it is re-posted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub policy: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs
///
/// Creates or re-posts a job. A supplied description is structured first; the
/// policy is validated before any model call.
pub async fn handle_upsert_job(
    State(state): State<AppState>,
    Json(request): Json<UpsertJobRequest>,
) -> Result<(StatusCode, Json<UpsertJobResponse>), AppError> {
    let job_id = request.job_id.trim().to_string();
    if job_id.is_empty() {
        return Err(AppError::Validation("job_id cannot be empty".to_string()));
    }

    let policy = request.policy.unwrap_or_else(PolicyInput::manual);
    policy.validate()?;

    let description = request
        .description
        .filter(|d| !d.trim().is_empty());

    let mut warning = None;
    let mut structured_jd = None;
    let mut derived_title = None;
    if let Some(text) = &description {
        match structure_job_description(text, state.llm.as_ref()).await {
            Ok(jd) => {
                derived_title = jd.job_title.clone();
                structured_jd = Some(serde_json::to_value(&jd).map_err(anyhow::Error::from)?);
            }
            Err(e) => {
                warn!("Job {job_id} saved without structured description: {e}");
                warning = Some(format!("job description could not be structured: {e}"));
            }
        }
    }

    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .or(derived_title)
        .unwrap_or_else(|| format!("Job {job_id}"));

    let draft = JobDraft {
        job_id,
        title,
        description,
        structured_jd,
        policy,
    };
    let job = state.policies.upsert_job(&draft).await?;

    Ok((
        StatusCode::CREATED,
        Json(UpsertJobResponse {
            job,
            structured: draft.structured_jd.is_some(),
            warning,
        }),
    ))
}

/// GET /api/v1/jobs/:job_id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.policies.get_job(&job_id).await?))
}

/// GET /api/v1/jobs?policy=scheduled
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let kind: PolicyKind = query
        .policy
        .parse()
        .map_err(|_| PolicyError::UnknownKind(query.policy.clone()))?;
    Ok(Json(state.policies.list_by_policy_kind(kind).await?))
}

/// GET /api/v1/jobs/:job_id/policy
pub async fn handle_get_policy(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<AnalysisPolicy>, AppError> {
    Ok(Json(state.policies.get_policy(&job_id).await?))
}

/// PUT /api/v1/jobs/:job_id/policy
pub async fn handle_set_policy(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(input): Json<PolicyInput>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.policies.set_policy(&job_id, &input).await?))
}

/// PUT /api/v1/jobs/:job_id/status
pub async fn handle_set_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(
        state
            .policies
            .set_job_status(&job_id, &request.status)
            .await?,
    ))
}
