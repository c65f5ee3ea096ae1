use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use tracing::{info, warn};

use rocketry_db::Database;
use rocketry_types::api::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};

use crate::credentials::{self, CredentialError};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::stripe::WebhookVerifier;
use crate::token::TokenService;

pub type AppState = Arc<AppStateInner>;

/// Process-wide state, built once at startup and read-only afterwards.
pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub webhooks: WebhookVerifier,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    // Argon2 is deliberately slow; keep it off the async workers.
    let user = crate::blocking(move || {
        let full_name = req.full_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        Ok(credentials::create_user(&state.db, &req.email, full_name, &req.password)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = crate::blocking(move || {
        let user = credentials::verify_credentials(&state.db, &req.email, &req.password).map_err(|e| {
            if matches!(e, CredentialError::InvalidCredentials) {
                warn!("Failed login attempt");
            }
            e
        })?;

        let token = state
            .tokens
            .issue(&user.email)
            .map_err(|e| ApiError::Infrastructure(e.into()))?;
        info!("User {} logged in", user.id);
        Ok(token)
    })
    .await?;

    Ok(Json(TokenResponse::bearer(token)))
}

/// GET /api/users/me
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(user.into())
}
