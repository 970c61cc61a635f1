use std::sync::Arc;

use sqlx::SqlitePool;

use crate::llm_client::TextCompletion;
use crate::policy::PolicyStore;
use crate::rating::RatingOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Used directly only for job description structuring; rating goes
    /// through the orchestrator.
    pub llm: Arc<dyn TextCompletion>,
    pub orchestrator: Arc<RatingOrchestrator>,
    pub policies: Arc<PolicyStore>,
}
