//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the rocketry-types models so the password hash and raw
//! column encodings stay inside this crate.

use chrono::{DateTime, NaiveDateTime, Utc};
use rocketry_types::models::{Course, Enrollment, SponsorTier, User};
use tracing::warn;
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CourseRow {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
}

pub struct EnrollmentRow {
    pub id: i64,
    pub user_id: String,
    pub course_id: i64,
    pub paid: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// An enrollment joined with the course it references.
pub struct EnrollmentDetailRow {
    pub enrollment: EnrollmentRow,
    pub course: CourseRow,
}

pub struct SponsorTierRow {
    pub id: i64,
    pub name: String,
    pub price_gbp: i64,
    pub perks: String,
    pub display_order: i64,
}

impl UserRow {
    pub fn to_user(&self) -> User {
        User {
            id: parse_uuid(&self.id, "user"),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            is_active: self.is_active,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: row.id,
            slug: row.slug,
            title: row.title,
            description: row.description,
            price_cents: row.price_cents,
        }
    }
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            id: row.id,
            user_id: parse_uuid(&row.user_id, "enrollment user"),
            course_id: row.course_id,
            paid: row.paid,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

impl From<SponsorTierRow> for SponsorTier {
    fn from(row: SponsorTierRow) -> Self {
        let perks = serde_json::from_str(&row.perks).unwrap_or_else(|e| {
            warn!("Corrupt perks on sponsor tier '{}': {}", row.name, e);
            serde_json::Value::Null
        });
        SponsorTier {
            id: row.id,
            name: row.name,
            price_gbp: row.price_gbp,
            perks,
            order: row.display_order,
        }
    }
}

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

/// SQLite's `datetime('now')` yields "YYYY-MM-DD HH:MM:SS" in UTC with no
/// zone suffix; RFC 3339 is accepted too.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_sqlite_timestamps() {
        let ts = parse_timestamp("2024-03-09 17:45:02");
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 9));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (17, 45, 2));
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::default());
    }
}
