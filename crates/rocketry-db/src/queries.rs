use crate::Database;
use crate::models::{CourseRow, EnrollmentDetailRow, EnrollmentRow, SponsorTierRow, UserRow};
use anyhow::Result;
use rocketry_types::models::{NewCourse, NewSponsorTier};
use rusqlite::{Connection, OptionalExtension, Row};

/// Result of inserting an enrollment. Dangling references are outcomes, not
/// storage failures.
pub enum EnrollmentInsert {
    Created(EnrollmentRow),
    MissingUser,
    MissingCourse,
}

/// Result of flipping an enrollment's paid flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidTransition {
    /// unpaid -> paid happened in this call.
    Paid,
    /// Already paid; nothing changed.
    AlreadyPaid,
    NotFound,
}

/// Result of applying a provider payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventOutcome {
    /// The event id was seen before; nothing changed.
    Duplicate,
    Applied(PaidTransition),
}

const USER_COLUMNS: &str =
    "id, email, hashed_password, full_name, is_active, created_at, updated_at";
const COURSE_COLUMNS: &str = "id, slug, title, description, price_cents";
const ENROLLMENT_COLUMNS: &str = "id, user_id, course_id, paid, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns `None` when the email is already registered;
    /// the unique index decides, so concurrent registrations cannot both win.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        full_name: Option<&str>,
        password_hash: &str,
    ) -> Result<Option<UserRow>> {
        self.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT INTO users (id, email, full_name, hashed_password) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![id, email, full_name, password_hash],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_user_by_id(tx, id)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    /// Delete a user and, through the foreign key cascade, their enrollments.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| Ok(tx.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Courses --

    pub fn list_courses(&self) -> Result<Vec<CourseRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY id ASC"))?;
            let rows = stmt
                .query_map([], course_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_course(&self, id: i64) -> Result<Option<CourseRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
                    [id],
                    course_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Insert a course, or refresh the existing one with the same slug.
    pub fn upsert_course(&self, course: &NewCourse) -> Result<CourseRow> {
        self.with_tx(|tx| {
            let row = tx.query_row(
                &format!(
                    "INSERT INTO courses (slug, title, description, price_cents) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(slug) DO UPDATE SET
                         title = excluded.title,
                         description = excluded.description,
                         price_cents = excluded.price_cents,
                         updated_at = datetime('now')
                     RETURNING {COURSE_COLUMNS}"
                ),
                rusqlite::params![course.slug, course.title, course.description, course.price_cents],
                course_from_row,
            )?;
            Ok(row)
        })
    }

    // -- Enrollments --

    pub fn create_enrollment(
        &self,
        user_id: &str,
        course_id: i64,
        paid: bool,
    ) -> Result<EnrollmentInsert> {
        self.with_tx(|tx| {
            if !exists(tx, "SELECT 1 FROM users WHERE id = ?1", user_id)? {
                return Ok(EnrollmentInsert::MissingUser);
            }
            if !exists(tx, "SELECT 1 FROM courses WHERE id = ?1", course_id)? {
                return Ok(EnrollmentInsert::MissingCourse);
            }

            let row = tx.query_row(
                &format!(
                    "INSERT INTO enrollments (user_id, course_id, paid) VALUES (?1, ?2, ?3)
                     RETURNING {ENROLLMENT_COLUMNS}"
                ),
                rusqlite::params![user_id, course_id, paid],
                enrollment_from_row,
            )?;
            Ok(EnrollmentInsert::Created(row))
        })
    }

    pub fn get_enrollment(&self, id: i64) -> Result<Option<EnrollmentRow>> {
        self.with_conn(|conn| query_enrollment(conn, id))
    }

    /// A user's enrollments with their courses, oldest first, in one query.
    pub fn list_enrollments_for_user(&self, user_id: &str) -> Result<Vec<EnrollmentDetailRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.user_id, e.course_id, e.paid, e.created_at, e.updated_at,
                        c.id, c.slug, c.title, c.description, c.price_cents
                 FROM enrollments e
                 JOIN courses c ON c.id = e.course_id
                 WHERE e.user_id = ?1
                 ORDER BY e.id ASC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(EnrollmentDetailRow {
                        enrollment: enrollment_from_row(row)?,
                        course: CourseRow {
                            id: row.get(6)?,
                            slug: row.get(7)?,
                            title: row.get(8)?,
                            description: row.get(9)?,
                            price_cents: row.get(10)?,
                        },
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn mark_enrollment_paid(&self, id: i64) -> Result<PaidTransition> {
        self.with_tx(|tx| mark_paid(tx, id))
    }

    /// Record a provider event id and apply its paid transition in the same
    /// transaction. A redelivered event id changes nothing.
    pub fn apply_payment_event(
        &self,
        event_id: &str,
        event_type: &str,
        enrollment_id: i64,
    ) -> Result<PaymentEventOutcome> {
        self.with_tx(|tx| {
            let recorded = tx.execute(
                "INSERT INTO webhook_events (event_id, event_type, enrollment_id, result)
                 VALUES (?1, ?2, ?3, 'pending')
                 ON CONFLICT(event_id) DO NOTHING",
                rusqlite::params![event_id, event_type, enrollment_id],
            )?;
            if recorded == 0 {
                return Ok(PaymentEventOutcome::Duplicate);
            }

            let transition = mark_paid(tx, enrollment_id)?;
            let result = match transition {
                PaidTransition::Paid => "paid",
                PaidTransition::AlreadyPaid => "already_paid",
                PaidTransition::NotFound => "enrollment_missing",
            };
            tx.execute(
                "UPDATE webhook_events SET result = ?1 WHERE event_id = ?2",
                rusqlite::params![result, event_id],
            )?;

            Ok(PaymentEventOutcome::Applied(transition))
        })
    }

    /// Record an event that carried nothing actionable so redeliveries are
    /// recognised. Returns `false` when the event id was already recorded.
    pub fn record_ignored_event(&self, event_id: &str, event_type: &str, reason: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let recorded = tx.execute(
                "INSERT INTO webhook_events (event_id, event_type, result) VALUES (?1, ?2, ?3)
                 ON CONFLICT(event_id) DO NOTHING",
                rusqlite::params![event_id, event_type, reason],
            )?;
            Ok(recorded > 0)
        })
    }

    // -- Sponsor tiers --

    pub fn list_sponsor_tiers(&self) -> Result<Vec<SponsorTierRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, price_gbp, perks, display_order FROM sponsor_tiers
                 ORDER BY display_order ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SponsorTierRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        price_gbp: row.get(2)?,
                        perks: row.get(3)?,
                        display_order: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete every tier and insert `tiers` in one transaction. If any insert
    /// fails the previous set is left untouched.
    pub fn replace_sponsor_tiers(&self, tiers: &[NewSponsorTier]) -> Result<usize> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM sponsor_tiers", [])?;

            let mut stmt = tx.prepare(
                "INSERT INTO sponsor_tiers (name, price_gbp, perks, display_order) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for tier in tiers {
                let perks = serde_json::to_string(&tier.perks)?;
                stmt.execute(rusqlite::params![tier.name, tier.price_gbp, perks, tier.order])?;
            }

            Ok(tiers.len())
        })
    }
}

fn mark_paid(conn: &Connection, id: i64) -> Result<PaidTransition> {
    let updated = conn.execute(
        "UPDATE enrollments SET paid = 1, updated_at = datetime('now') WHERE id = ?1 AND paid = 0",
        [id],
    )?;
    if updated == 1 {
        return Ok(PaidTransition::Paid);
    }

    if exists(conn, "SELECT 1 FROM enrollments WHERE id = ?1", id)? {
        Ok(PaidTransition::AlreadyPaid)
    } else {
        Ok(PaidTransition::NotFound)
    }
}

fn exists<P: rusqlite::ToSql>(conn: &Connection, sql: &str, param: P) -> Result<bool> {
    let found = conn
        .query_row(sql, [param], |_| Ok(()))
        .optional()?
        .is_some();
    Ok(found)
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_enrollment(conn: &Connection, id: i64) -> Result<Option<EnrollmentRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = ?1"),
            [id],
            enrollment_from_row,
        )
        .optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        hashed_password: row.get(2)?,
        full_name: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        price_cents: row.get(4)?,
    })
}

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<EnrollmentRow> {
    Ok(EnrollmentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        course_id: row.get(2)?,
        paid: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
