/// Course catalog REST API endpoints
///
/// Reads are public and served from the in-memory registry; mutations are
/// admin-only and hot-reload the registry entry they touch.

use crate::{
    api::{AppState, AuthUser},
    catalog::CourseInput,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};

pub fn create_course_routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/{id}", get(get_course).put(update_course).delete(delete_course))
}

/// List all courses
///
/// GET /api/courses
async fn list_courses(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "courses": state.catalog.list_courses() }))
}

/// GET /api/courses/{id}
async fn get_course(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let course = state
        .catalog
        .get_course(&id)
        .ok_or_else(|| AppError::NotFound("Course".to_string()))?;
    Ok(Json(json!({ "course": course })))
}

/// Create a course
///
/// POST /api/courses
/// Body: { "title": "...", "fee": 50000, "duration": "24 weeks", ... }
async fn create_course(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(input): Json<CourseInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    caller.require_admin()?;
    let course = state.catalog.create_course(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Course created successfully", "course": course })),
    ))
}

/// PUT /api/courses/{id}
async fn update_course(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<CourseInput>,
) -> AppResult<Json<Value>> {
    caller.require_admin()?;
    let course = state.catalog.update_course(&id, input).await?;
    Ok(Json(json!({ "message": "Course updated successfully", "course": course })))
}

/// Delete a course nothing references
///
/// DELETE /api/courses/{id}
async fn delete_course(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    caller.require_admin()?;
    state.catalog.delete_course(&id).await?;
    Ok(Json(json!({ "message": "Course deleted successfully" })))
}
