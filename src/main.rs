use lotwise::datasource::HttpLegSource;
use lotwise::orchestration::Session;
use lotwise::{api, config::Config, LegSource};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let source: Arc<dyn LegSource> = Arc::new(HttpLegSource::new(config.leg_source_url.clone()));
    let session = Arc::new(Session::new(
        source,
        config.fetch_options(),
        config.cost_basis_method,
        config.max_history_rounds,
    ));

    tracing::info!(
        "Using leg source {} with {} cost basis",
        config.leg_source_url,
        config.cost_basis_method
    );

    let app = api::create_router(api::AppState::new(session, config));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
