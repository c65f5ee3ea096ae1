pub mod auth;
pub mod courses;
pub mod credentials;
pub mod enrollments;
pub mod error;
pub mod middleware;
pub mod sponsors;
pub mod stripe;
pub mod token;
pub mod webhooks;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::error;

use crate::auth::AppState;
use crate::error::ApiError;

/// Run blocking work (SQLite, Argon2) on the blocking pool.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Infrastructure(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Every API route. Cross-cutting layers (CORS, tracing, static assets) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/courses", get(courses::get_courses))
        .route("/api/sponsors", get(sponsors::get_sponsor_tiers))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook));

    let protected_routes = Router::new()
        .route("/api/users/me", get(auth::me))
        .route("/api/users/me/enrollments", get(courses::my_enrollments))
        .route("/api/courses/{course_id}/enroll", post(courses::enroll))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
