use axum::{middleware, routing::get_service, Router};
use std::path::Path;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymdesk::api;
use gymdesk::api::middleware::auth::require_auth;
use gymdesk::api::middleware::session::{create_session_layer, AppState};
use gymdesk::config::Config;
use gymdesk::db;
use gymdesk::jobs::subscription_expiry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymdesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting gymdesk server...");

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let session_layer = create_session_layer(pool.clone(), config.uses_https()).await?;
    tracing::info!("Session layer initialized");

    let state = AppState::new(pool.clone(), config.clone());
    if state.storage.is_none() {
        tracing::warn!("Storage API not configured; member photo uploads are disabled");
    }

    // Kept alive for the lifetime of the server
    let _scheduler = subscription_expiry::start_scheduler(pool.clone(), &config.expiry_sweep_schedule)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start expiry scheduler: {:?}", e))?;

    let static_routes = Router::new().nest_service(
        "/static",
        get_service(ServeDir::new(Path::new("web").join("static"))),
    );

    // JSON-only gym routes; pages handle a missing login by redirecting instead
    let gym_api_routes = Router::new()
        .merge(api::check_ins::router())
        .merge(api::plans::router())
        .merge(api::payments::router())
        .merge(api::products::router())
        .route_layer(middleware::from_fn(require_auth));

    let app = Router::new()
        .merge(api::health::router())
        .merge(api::auth::router())
        .merge(api::gyms::router())
        .merge(api::dashboard::router())
        .merge(api::members::router())
        .merge(api::staff::router())
        .merge(gym_api_routes)
        .merge(api::billing::router())
        .merge(api::cron::router())
        .merge(static_routes)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
