use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::query::{parse_method, parse_prices, resolve_context};
use super::AppState;
use crate::error::AppError;
use crate::orchestration::AnalyticsView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub wallets: Option<String>,
    pub networks: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub method: Option<String>,
    /// Current prices for the unrealized view, e.g. `ETH:2500,0xa0b8...:1`.
    pub prices: Option<String>,
}

pub async fn get_analytics(
    Query(params): Query<AnalyticsQuery>,
    State(state): State<AppState>,
) -> Result<Json<AnalyticsView>, AppError> {
    let context = resolve_context(
        params.wallets.as_deref(),
        params.networks.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
        &state.config,
    )?;
    let method = parse_method(params.method.as_deref())?;
    let prices = parse_prices(params.prices.as_deref())?;

    let view = state.session.analytics(&context, method, &prices).await?;
    Ok(Json(view))
}
