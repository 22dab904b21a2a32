use axum::{
    http::{HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::api::{
    handler::{
        back, confirm, enter_amount, get_session, health_check, list_ledgers, reset,
        select_asset, select_ledger, AppState,
    },
    streaming::stream_progress,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/ledgers", get(list_ledgers))
                // Funding session
                .route("/funding/session", get(get_session))
                .route("/funding/ledger", post(select_ledger))
                .route("/funding/asset", post(select_asset))
                .route("/funding/amount", post(enter_amount))
                .route("/funding/confirm", post(confirm))
                .route("/funding/back", post(back))
                .route("/funding/reset", post(reset))
                .route("/funding/stream", get(stream_progress)),
        )
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::very_permissive())
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
