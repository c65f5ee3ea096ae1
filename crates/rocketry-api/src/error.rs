use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::credentials::CredentialError;
use crate::enrollments::EnrollmentError;
use crate::webhooks::WebhookError;

/// Every failure a handler can surface, mapped onto one status and message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad input shape. Not retryable; the caller has to fix the request.
    #[error("{0}")]
    Validation(String),

    /// Request body or path the extractors could not decode.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// Any authentication failure. Deliberately carries no detail.
    #[error("Could not validate credentials")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Email already registered")]
    Conflict,

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Malformed webhook payload")]
    MalformedWebhook,

    /// Database or runtime failure. Safe for the caller to retry.
    #[error("Service temporarily unavailable")]
    Infrastructure(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Rejected { status, .. } => *status,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::SignatureInvalid | Self::MalformedWebhook => StatusCode::BAD_REQUEST,
            Self::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Infrastructure(e) = &self {
            error!("Infrastructure failure: {:#}", e);
        }

        let status = self.status();
        let mut response = (status, Json(json!({ "detail": self.to_string() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::DuplicateEmail => Self::Conflict,
            CredentialError::WeakPassword
            | CredentialError::InvalidEmail
            | CredentialError::InvalidFullName => Self::Validation(e.to_string()),
            CredentialError::InvalidCredentials => Self::Unauthenticated,
            CredentialError::Storage(e) => Self::Infrastructure(e),
        }
    }
}

impl From<EnrollmentError> for ApiError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::UserNotFound => Self::NotFound("User"),
            EnrollmentError::CourseNotFound => Self::NotFound("Course"),
            EnrollmentError::EnrollmentNotFound => Self::NotFound("Enrollment"),
            EnrollmentError::Storage(e) => Self::Infrastructure(e),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::SignatureInvalid => Self::SignatureInvalid,
            WebhookError::Malformed(_) => Self::MalformedWebhook,
            WebhookError::Storage(e) => Self::Infrastructure(e),
        }
    }
}
