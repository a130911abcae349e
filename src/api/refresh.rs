use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub address: String,
    pub cleared_contexts: usize,
}

/// Drop cached pages for every context touching wallets with this prefix.
pub async fn post_refresh(
    Query(params): Query<RefreshQuery>,
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, AppError> {
    let address = params
        .address
        .as_deref()
        .map(|a| a.trim().to_ascii_lowercase())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::BadRequest("address is required".into()))?;

    let cleared_contexts = state.session.refresh(&address);
    Ok(Json(RefreshResponse {
        address,
        cleared_contexts,
    }))
}
