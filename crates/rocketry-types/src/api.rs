use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Course, SponsorTier, User};

// -- JWT Claims --

/// Bearer token payload. `sub` is the account email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// -- Courses & enrollments --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseResponse {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
}

impl From<Course> for CourseResponse {
    fn from(course: Course) -> Self {
        Self {
            id: course.id,
            slug: course.slug,
            title: course.title,
            description: course.description,
            price_cents: course.price_cents,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub id: i64,
    pub course: CourseResponse,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

// -- Sponsors --

#[derive(Debug, Serialize, Deserialize)]
pub struct SponsorTierResponse {
    pub id: i64,
    pub name: String,
    pub price_gbp: i64,
    pub perks: serde_json::Value,
}

impl From<SponsorTier> for SponsorTierResponse {
    fn from(tier: SponsorTier) -> Self {
        Self {
            id: tier.id,
            name: tier.name,
            price_gbp: tier.price_gbp,
            perks: tier.perks,
        }
    }
}

// -- Webhooks --

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}
