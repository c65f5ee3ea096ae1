use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use rocketry_types::api::Claims;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("unsupported signing algorithm {0:?}; expected HS256, HS384 or HS512")]
    UnsupportedAlgorithm(Algorithm),
    #[error("token lifetime is out of range")]
    LifetimeOutOfRange,
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Issues and validates symmetric-key signed bearer tokens.
///
/// Built once at startup from the configured secret and shared read-only.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], algorithm: Algorithm, default_ttl: Duration) -> Result<Self, TokenError> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(TokenError::UnsupportedAlgorithm(algorithm));
        }

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            default_ttl,
        })
    }

    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        self.issue_with_ttl(subject, self.default_ttl)
    }

    pub fn issue_with_ttl(&self, subject: &str, ttl: Duration) -> Result<String, TokenError> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or(TokenError::LifetimeOutOfRange)?;
        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp().max(0) as usize,
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding)?)
    }

    /// Verify the signature and expiry and return the subject email.
    pub fn validate(&self, token: &str) -> Result<String, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;

        if data.claims.sub.is_empty() {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims.sub)
    }
}
