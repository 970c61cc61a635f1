use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and the daily
/// triggers the scheduler currently holds.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let triggers: Vec<Value> = state
        .policies
        .daily_triggers()
        .await
        .into_iter()
        .map(|(job_id, time)| json!({ "job_id": job_id, "time": time }))
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME"),
        "daily_triggers": triggers
    }))
}
