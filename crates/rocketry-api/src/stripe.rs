//! Stripe webhook signatures and event payloads.
//!
//! Header format: `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`. The
//! signed message is `"<t>.<raw body>"`, HMAC-SHA256 keyed with the endpoint
//! secret. Any one matching `v1` entry is enough.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::webhooks::WebhookError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Default replay window, matching Stripe's client libraries.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for timestamps from the future.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(WebhookError::SignatureInvalid);
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| WebhookError::SignatureInvalid)?);
                }
                "v1" => {
                    // Skip undecodable entries; another v1 may still match.
                    if let Ok(sig) = hex::decode(value) {
                        v1_signatures.push(sig);
                    }
                }
                // v0 and future schemes are not trusted.
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::SignatureInvalid)?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::SignatureInvalid);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifies webhook authenticity against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, signature_header, Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], signature_header: &str, now: i64) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        let age = now
            .checked_sub(header.timestamp)
            .ok_or(WebhookError::SignatureInvalid)?;
        if age > self.tolerance_secs || age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::SignatureInvalid);
        }

        let mac = self.mac_for(header.timestamp, payload)?;
        // verify_slice compares in constant time.
        let matched = header
            .v1_signatures
            .iter()
            .any(|sig| mac.clone().verify_slice(sig).is_ok());

        if matched { Ok(()) } else { Err(WebhookError::SignatureInvalid) }
    }

    /// Compute the hex `v1` signature for a payload. Used to build fixtures.
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
        let mac = self.mac_for(timestamp, payload)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| WebhookError::Storage(anyhow::anyhow!("HMAC key rejected: {}", e)))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

// -- Event payloads --

/// The subset of a Stripe event this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeEventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentSucceeded,
    Other,
}

impl StripeEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "payment_intent.succeeded" => EventKind::PaymentSucceeded,
            // Async payment methods complete the session before funds arrive.
            "checkout.session.completed" => match self.data.object.get("payment_status") {
                Some(status) if status != "paid" => EventKind::Other,
                _ => EventKind::PaymentSucceeded,
            },
            "checkout.session.async_payment_succeeded" => EventKind::PaymentSucceeded,
            _ => EventKind::Other,
        }
    }

    /// Enrollment id from `metadata.enrollment_id`, else `client_reference_id`.
    pub fn enrollment_reference(&self) -> Option<i64> {
        let object = &self.data.object;
        object
            .get("metadata")
            .and_then(|m| m.get("enrollment_id"))
            .and_then(as_id)
            .or_else(|| object.get("client_reference_id").and_then(as_id))
    }
}

fn as_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
