use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;

use rocketry_db::Database;
use rocketry_types::api::{CourseResponse, EnrollmentResponse};
use rocketry_types::models::Course;

use crate::auth::AppState;
use crate::enrollments;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// All courses, by id ascending. The catalog is small, so no paging.
pub fn list_courses(db: &Database) -> anyhow::Result<Vec<Course>> {
    Ok(db.list_courses()?.into_iter().map(Course::from).collect())
}

/// GET /api/courses
pub async fn get_courses(State(state): State<AppState>) -> Result<Json<Vec<CourseResponse>>, ApiError> {
    let courses = crate::blocking(move || Ok(list_courses(&state.db)?)).await?;
    Ok(Json(courses.into_iter().map(CourseResponse::from).collect()))
}

/// POST /api/courses/{course_id}/enroll
pub async fn enroll(
    State(state): State<AppState>,
    WithRejection(Path(course_id), _): WithRejection<Path<i64>, ApiError>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (enrollment, course) =
        crate::blocking(move || Ok(enrollments::enroll_in_course(&state.db, user.id, course_id)?)).await?;

    Ok((
        StatusCode::CREATED,
        Json(EnrollmentResponse {
            id: enrollment.id,
            course: course.into(),
            paid: enrollment.paid,
            created_at: enrollment.created_at,
        }),
    ))
}

/// GET /api/users/me/enrollments
pub async fn my_enrollments(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<EnrollmentResponse>>, ApiError> {
    let enrollments = crate::blocking(move || Ok(enrollments::list_for_user(&state.db, user.id)?)).await?;
    Ok(Json(enrollments))
}
