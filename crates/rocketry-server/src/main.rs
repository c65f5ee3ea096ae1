mod config;
mod seed;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rocketry_api::auth::{AppState, AppStateInner};
use rocketry_api::stripe::WebhookVerifier;
use rocketry_api::token::TokenService;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rocketry=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = rocketry_db::Database::open(&config.db_path)?;

    if let Some(path) = &config.seed_path {
        let seed = seed::load(path)?;
        seed::apply(&db, &seed)?;
        info!("Applied seed data from {}", path.display());
    }

    let tokens = TokenService::new(
        &config.secret_key,
        config.jwt_algorithm,
        chrono::Duration::minutes(config.token_ttl_minutes),
    )?;
    let webhooks = WebhookVerifier::new(config.webhook_secret.clone(), config.webhook_tolerance_secs);

    // Shared state
    let state: AppState = Arc::new(AppStateInner { db, tokens, webhooks });

    let origins = config
        .cors_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin {o:?}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let mut app = rocketry_api::router(state);

    // Served by nginx in production; mounted here when the directory exists.
    if config.assets_dir.is_dir() {
        info!("Serving static assets from {}", config.assets_dir.display());
        app = app.nest_service("/assets", ServeDir::new(&config.assets_dir));
    } else {
        warn!("Assets directory {} not found; /assets disabled", config.assets_dir.display());
    }

    let app = app.layer(cors).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Rocketry API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
