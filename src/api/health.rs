use crate::api::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Ready once state is built; reports what the cache currently holds.
pub async fn ready(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "costBasisMethod": state.session.method(),
        "cachedContexts": state.session.raw().context_count(),
    }))
}
