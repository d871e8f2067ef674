//! HTTP request handlers. All of them are read-only projections.

use super::AppState;
use crate::environment::EnvironmentSnapshot;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn handle_list_environments(State(state): State<AppState>) -> impl IntoResponse {
    let snapshots: Vec<EnvironmentSnapshot> =
        state.environments.iter().map(|env| env.snapshot(false)).collect();
    Json(snapshots)
}

pub async fn handle_get_environment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.environments.iter().find(|env| env.name().eq_ignore_ascii_case(&name)) {
        Some(env) => Json(env.snapshot(true)).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown environment: {}", name)).into_response(),
    }
}
