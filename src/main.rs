use funding_orchestrator::{bootstrap, config::Settings, server};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,funding_orchestrator=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenv::dotenv().ok();

    init_tracing();

    info!("🚀 Starting Cross-Ledger Funding Orchestrator");

    let settings = Settings::from_env()?;

    let state = bootstrap::initialize_app_state(&settings).await?;

    // Create HTTP server
    let app = server::create_app(state).await;

    // Run the Server
    server::run_server(app, &settings.server.bind_address).await?;

    Ok(())
}
