/// Enrollment REST API endpoints
///
/// `payment-enroll` is public: the payment token in the body is the
/// credential. Every other route acts for the signed-in caller.

use crate::{
    api::{AppState, AuthUser},
    enrollment::PaymentRedemption,
    error::AppResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub course_id: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

fn default_payment_method() -> String {
    "card".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress: i64,
}

pub fn create_enrollment_routes() -> Router<AppState> {
    Router::new()
        .route("/enrollments/payment-enroll", post(payment_enroll))
        .route("/enrollments/enroll", post(enroll))
        .route("/enrollments/my-courses", get(my_courses))
        .route("/enrollments/status/{course_id}", get(enrollment_status))
        .route("/enrollments/{id}/progress", put(update_progress))
}

/// Redeem a payment token
///
/// POST /api/enrollments/payment-enroll
/// Body: { "paymentToken": "...", "paymentMethod": "upi", "userEmail": "...", "userName": "..." }
async fn payment_enroll(
    State(state): State<AppState>,
    Json(payload): Json<PaymentRedemption>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let outcome = state.engine.redeem_payment(payload).await?;
    let message = if outcome.account_created {
        "Payment successful. Your account has been created and login details sent to your email"
    } else {
        "Payment successful. You are now enrolled"
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": message,
            "enrollment": outcome.enrollment,
            "userId": outcome.user_id,
            "accountCreated": outcome.account_created,
        })),
    ))
}

/// Enroll the signed-in caller directly
///
/// POST /api/enrollments/enroll
/// Body: { "courseId": "...", "paymentMethod": "card" }
async fn enroll(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<EnrollRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let enrollment = state
        .engine
        .enroll_direct(&caller.user, &payload.course_id, &payload.payment_method)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Enrolled successfully", "enrollment": enrollment })),
    ))
}

/// GET /api/enrollments/my-courses
async fn my_courses(State(state): State<AppState>, caller: AuthUser) -> AppResult<Json<Value>> {
    let enrollments = state.engine.my_enrollments(&caller.user).await?;
    Ok(Json(json!({ "enrollments": enrollments })))
}

/// GET /api/enrollments/status/{course_id}
async fn enrollment_status(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(course_id): Path<String>,
) -> AppResult<Json<Value>> {
    let enrollment = state.engine.enrollment_status(&caller.user, &course_id).await?;
    Ok(Json(json!({
        "enrolled": enrollment.is_some(),
        "enrollment": enrollment,
    })))
}

/// PUT /api/enrollments/{id}/progress
/// Body: { "progress": 40 }
async fn update_progress(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<ProgressRequest>,
) -> AppResult<Json<Value>> {
    let enrollment = state.engine.update_progress(&caller.user, &id, payload.progress).await?;
    Ok(Json(json!({ "message": "Progress updated", "enrollment": enrollment })))
}
