use tracing::info;
use uuid::Uuid;

use rocketry_db::{Database, EnrollmentInsert, PaidTransition};
use rocketry_types::api::EnrollmentResponse;
use rocketry_types::models::{Course, Enrollment};

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("user not found")]
    UserNotFound,
    #[error("course not found")]
    CourseNotFound,
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Record a user's enrollment in a course. Repeat enrollments in the same
/// course are allowed and each gets its own row.
pub fn enroll(db: &Database, user_id: Uuid, course_id: i64, paid: bool) -> Result<Enrollment, EnrollmentError> {
    match db.create_enrollment(&user_id.to_string(), course_id, paid)? {
        EnrollmentInsert::Created(row) => {
            info!(
                "Enrollment {} created: user {} in course {} (paid={})",
                row.id, user_id, course_id, paid
            );
            Ok(row.into())
        }
        EnrollmentInsert::MissingUser => Err(EnrollmentError::UserNotFound),
        EnrollmentInsert::MissingCourse => Err(EnrollmentError::CourseNotFound),
    }
}

/// Enroll a user in a course, starting paid when the course is free.
pub fn enroll_in_course(db: &Database, user_id: Uuid, course_id: i64) -> Result<(Enrollment, Course), EnrollmentError> {
    let course: Course = db
        .get_course(course_id)?
        .ok_or(EnrollmentError::CourseNotFound)?
        .into();
    let enrollment = enroll(db, user_id, course_id, course.is_free())?;
    Ok((enrollment, course))
}

/// Flip an enrollment to paid. Marking an already paid enrollment succeeds
/// without changing anything; there is no way back to unpaid.
pub fn mark_paid(db: &Database, enrollment_id: i64) -> Result<PaidTransition, EnrollmentError> {
    match db.mark_enrollment_paid(enrollment_id)? {
        PaidTransition::NotFound => Err(EnrollmentError::EnrollmentNotFound),
        transition => {
            if transition == PaidTransition::Paid {
                info!("Enrollment {} marked paid", enrollment_id);
            }
            Ok(transition)
        }
    }
}

pub fn list_for_user(db: &Database, user_id: Uuid) -> anyhow::Result<Vec<EnrollmentResponse>> {
    let rows = db.list_enrollments_for_user(&user_id.to_string())?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let enrollment: Enrollment = row.enrollment.into();
            let course: Course = row.course.into();
            EnrollmentResponse {
                id: enrollment.id,
                course: course.into(),
                paid: enrollment.paid,
                created_at: enrollment.created_at,
            }
        })
        .collect())
}
