use anyhow::Result;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sbqueue::config::Config;
use sbqueue::discord::DiscordClient;
use sbqueue::gateway::event_router;
use sbqueue::reputation::ReputationClient;
use sbqueue::AppState;

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "sbqueue"
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!(version = sbqueue::get_bot_version(), "starting permission queue bot");

    let config = Config::from_env()?;

    let discord = DiscordClient::new(config.token.clone());
    let reputation = ReputationClient::new(config.reputation_base_url.clone());

    let app_state = Arc::new(AppState {
        config,
        discord,
        reputation,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(event_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state.clone());

    let listener = TcpListener::bind(format!("0.0.0.0:{}", app_state.config.port)).await?;
    info!("server listening on port {}", app_state.config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
