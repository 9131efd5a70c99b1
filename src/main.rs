use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use fluxx_tiles_backend::{build_app, config::Config, db, grant_prune_task, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fluxx_tiles_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fluxx Tiles backend server...");

    // Load configuration
    let config = Config::from_env()?;
    let rules = config.session_rules();
    tracing::info!(
        "Configuration loaded: {} moves per {}s window, {} points per match",
        rules.move_allowance,
        config.game.move_refill_secs,
        rules.match_award
    );

    // Connect to database
    let db = db::create_pool(config.database_url(), config.database.max_connections).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    // Create application state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        recent_grants: DashMap::new(),
    });

    // Spawn background task to sweep expired point grants
    let prune_state = state.clone();
    tokio::spawn(async move {
        grant_prune_task(prune_state).await;
    });

    let app = build_app(state);

    // Start server
    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("Mini app frontend: http://{}/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
