use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::query::{parse_method, resolve_context};
use super::AppState;
use crate::error::AppError;
use crate::orchestration::GainsView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GainsQuery {
    pub wallets: Option<String>,
    pub networks: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub method: Option<String>,
}

pub async fn get_gains(
    Query(params): Query<GainsQuery>,
    State(state): State<AppState>,
) -> Result<Json<GainsView>, AppError> {
    let context = resolve_context(
        params.wallets.as_deref(),
        params.networks.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
        &state.config,
    )?;
    let method = parse_method(params.method.as_deref())?;

    let view = state.session.gains(&context, method).await?;
    Ok(Json(view))
}
