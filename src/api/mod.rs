pub mod analytics;
pub mod gains;
pub mod health;
pub mod query;
pub mod refresh;
pub mod transactions;

use crate::config::Config;
use crate::orchestration::Session;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub config: Config,
}

impl AppState {
    pub fn new(session: Arc<Session>, config: Config) -> Self {
        Self { session, config }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/transactions", get(transactions::get_transactions))
        .route("/v1/gains", get(gains::get_gains))
        .route("/v1/analytics", get(analytics::get_analytics))
        .route("/v1/refresh", post(refresh::post_refresh))
        .layer(cors)
        .with_state(state)
}
