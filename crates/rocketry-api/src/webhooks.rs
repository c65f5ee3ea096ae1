use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use tracing::{debug, info, warn};

use rocketry_db::{Database, PaidTransition, PaymentEventOutcome};
use rocketry_types::api::WebhookAck;

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::stripe::{EventKind, SIGNATURE_HEADER, StripeEvent, WebhookVerifier};

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook signature could not be verified")]
    SignatureInvalid,
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// What happened to a verified event. All of these are acknowledged to the
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event type this service does not act on.
    Ignored,
    /// Event id already processed.
    Duplicate,
    /// Payment event without a usable enrollment reference.
    Unreferenced,
    Applied(PaidTransition),
}

/// Verify, parse and apply one provider event.
pub fn handle_payment_event(
    db: &Database,
    verifier: &WebhookVerifier,
    payload: &[u8],
    signature_header: &str,
) -> Result<WebhookOutcome, WebhookError> {
    verifier.verify(payload, signature_header)?;
    apply_verified_event(db, payload)
}

fn apply_verified_event(db: &Database, payload: &[u8]) -> Result<WebhookOutcome, WebhookError> {
    let event: StripeEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    if event.kind() != EventKind::PaymentSucceeded {
        debug!("Ignoring webhook event {} of type {}", event.id, event.event_type);
        return Ok(WebhookOutcome::Ignored);
    }

    let Some(enrollment_id) = event.enrollment_reference() else {
        warn!("Payment event {} carries no enrollment reference", event.id);
        if !db.record_ignored_event(&event.id, &event.event_type, "no_enrollment_reference")? {
            return Ok(WebhookOutcome::Duplicate);
        }
        return Ok(WebhookOutcome::Unreferenced);
    };

    match db.apply_payment_event(&event.id, &event.event_type, enrollment_id)? {
        PaymentEventOutcome::Duplicate => {
            info!("Webhook event {} already processed", event.id);
            Ok(WebhookOutcome::Duplicate)
        }
        PaymentEventOutcome::Applied(PaidTransition::NotFound) => {
            warn!(
                "Payment event {} references unknown enrollment {}",
                event.id, enrollment_id
            );
            Ok(WebhookOutcome::Unreferenced)
        }
        PaymentEventOutcome::Applied(transition) => {
            info!(
                "Payment event {} applied to enrollment {}: {:?}",
                event.id, enrollment_id, transition
            );
            Ok(WebhookOutcome::Applied(transition))
        }
    }
}

/// POST /webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<Arc<AppStateInner>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("Webhook rejected: missing signature header");
            ApiError::SignatureInvalid
        })?
        .to_string();

    crate::blocking(move || {
        handle_payment_event(&state.db, &state.webhooks, &body, &signature).map_err(|e| {
            if matches!(e, WebhookError::SignatureInvalid) {
                warn!("Webhook rejected: signature verification failed");
            }
            ApiError::from(e)
        })
    })
    .await?;

    Ok(Json(WebhookAck { received: true }))
}
