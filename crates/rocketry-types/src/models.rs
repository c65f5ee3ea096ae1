use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account. The password hash never leaves the db crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    /// Minor currency units. Zero means the course is free.
    pub price_cents: i64,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: Uuid,
    pub course_id: i64,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorTier {
    pub id: i64,
    pub name: String,
    /// Whole pounds.
    pub price_gbp: i64,
    pub perks: serde_json::Value,
    pub order: i64,
}

// -- Catalog input --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCourse {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSponsorTier {
    pub name: String,
    pub price_gbp: i64,
    #[serde(default = "empty_perks")]
    pub perks: serde_json::Value,
    #[serde(default)]
    pub order: i64,
}

fn empty_perks() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
