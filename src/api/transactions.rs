use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::query::{parse_view, resolve_context};
use super::AppState;
use crate::cache::{FilterKey, FilteredPage};
use crate::error::AppError;
use crate::orchestration::LoadOutcome;

const DEFAULT_VIEW: &str = "transactions";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub wallets: Option<String>,
    pub networks: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<usize>,
    pub view: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub context: String,
    #[serde(flatten)]
    pub page: Option<FilteredPage>,
    pub superseded: bool,
}

pub async fn get_transactions(
    Query(params): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let context = resolve_context(
        params.wallets.as_deref(),
        params.networks.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
        &state.config,
    )?;

    let filter = match params.kind.as_deref().map(str::trim) {
        None | Some("") => FilterKey::All,
        Some(raw) => raw.parse::<FilterKey>()?,
    };
    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::BadRequest("page starts at 1".into()));
    }
    let view = parse_view(params.view.as_deref(), DEFAULT_VIEW)?;

    let outcome = state
        .session
        .load_page(view, &context, filter, page)
        .await?;

    let superseded = outcome.is_superseded();
    let page = match outcome {
        LoadOutcome::Committed(page) => Some(page),
        LoadOutcome::Superseded { current } => current,
    };

    Ok(Json(TransactionsResponse {
        context: context.key().to_string(),
        page,
        superseded,
    }))
}
