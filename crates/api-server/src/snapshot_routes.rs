//! Snapshot endpoints consumed by the dashboard.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{ApiError, AppState};

pub fn snapshot_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/data", get(get_latest_snapshot))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Newest dated snapshot, or `data.json` when no dated file exists.
async fn get_latest_snapshot(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = snapshot_pipeline::latest_artifact(&state.data_dir).ok_or(ApiError::NoSnapshot)?;

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ApiError::Read { path: path.clone(), source })?;
    let snapshot: Value =
        serde_json::from_str(&content).map_err(|source| ApiError::Parse { path, source })?;

    Ok(Json(snapshot))
}
