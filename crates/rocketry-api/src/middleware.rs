use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::debug;

use rocketry_db::Database;
use rocketry_types::models::User;

use crate::auth::AppState;
use crate::credentials;
use crate::error::ApiError;
use crate::token::TokenService;

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolve a bearer token to an active user.
///
/// Invalid or expired tokens, unknown subjects and inactive accounts all
/// fail with the same `Unauthenticated` error.
pub fn resolve_current_user(db: &Database, tokens: &TokenService, token: &str) -> Result<User, ApiError> {
    let email = tokens.validate(token).map_err(|e| {
        debug!("Bearer token rejected: {}", e);
        ApiError::Unauthenticated
    })?;

    match credentials::find_user_by_email(db, &email)? {
        Some(user) if user.is_active => Ok(user),
        _ => Err(ApiError::Unauthenticated),
    }
}

/// Extract the bearer token from the Authorization header and gate the
/// request on it.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Authorization(bearer) = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthenticated)?;
    let token = bearer.token().to_string();

    let user = crate::blocking(move || resolve_current_user(&state.db, &state.tokens, &token)).await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
