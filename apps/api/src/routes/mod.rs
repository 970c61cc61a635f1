pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::policy::handlers as jobs;
use crate::ranking::handlers as ranking;
use crate::rating::handlers as rating;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Jobs and analysis policies
        .route(
            "/api/v1/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_upsert_job),
        )
        .route("/api/v1/jobs/:job_id", get(jobs::handle_get_job))
        .route(
            "/api/v1/jobs/:job_id/policy",
            get(jobs::handle_get_policy).put(jobs::handle_set_policy),
        )
        .route("/api/v1/jobs/:job_id/status", put(jobs::handle_set_job_status))
        // Applications
        .route(
            "/api/v1/jobs/:job_id/applications",
            post(rating::handle_apply),
        )
        .route(
            "/api/v1/jobs/:job_id/applications/:applicant_id",
            get(rating::handle_get_application),
        )
        .route(
            "/api/v1/jobs/:job_id/applications/:applicant_id/status",
            put(rating::handle_set_application_status),
        )
        // Rating and ranking
        .route(
            "/api/v1/jobs/:job_id/applications/:applicant_id/rate",
            post(rating::handle_rate_application),
        )
        .route("/api/v1/jobs/:job_id/sweep", post(rating::handle_sweep))
        .route(
            "/api/v1/jobs/:job_id/filter-relevant",
            post(rating::handle_filter_relevant),
        )
        .route("/api/v1/jobs/:job_id/ranking", get(ranking::handle_ranking))
        .with_state(state)
}
