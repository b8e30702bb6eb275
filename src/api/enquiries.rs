/// Enquiry REST API endpoints
///
/// Submission and the payment-link lookup are public. Listing, detail and
/// status changes need an admin session; the engine re-checks the role.

use crate::{
    api::{AppState, AuthUser},
    enrollment::{EnquiryStatus, NewEnquiry, StatusUpdate},
    error::{AppError, AppResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub struct EnquiryFilter {
    pub status: Option<String>,
}

impl EnquiryFilter {
    /// Blank and "all" mean no filter
    fn status(&self) -> AppResult<Option<EnquiryStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(AppError::Validation),
        }
    }
}

pub fn create_enquiry_routes() -> Router<AppState> {
    Router::new()
        .route("/enquiries", get(list_enquiries).post(submit_enquiry))
        .route("/enquiries/payment/{token}", get(resolve_payment_token))
        .route("/enquiries/{id}", get(get_enquiry))
        .route("/enquiries/{id}/status", put(update_status))
}

/// Submit an enquiry from the public form
///
/// POST /api/enquiries
/// Body: { "name": "...", "email": "...", "phone": "...", "course": "...", "message": "..." }
async fn submit_enquiry(
    State(state): State<AppState>,
    Json(payload): Json<NewEnquiry>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let enquiry = state.engine.submit_enquiry(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Enquiry submitted successfully",
            "enquiry": enquiry
        })),
    ))
}

/// List enquiries, newest first
///
/// GET /api/enquiries?status=approved
async fn list_enquiries(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(filter): Query<EnquiryFilter>,
) -> AppResult<Json<Value>> {
    let status = filter.status()?;
    let enquiries = state.engine.list_enquiries(&caller.user, status).await?;
    Ok(Json(json!({ "enquiries": enquiries })))
}

/// GET /api/enquiries/{id}
async fn get_enquiry(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let enquiry = state.engine.get_enquiry(&caller.user, &id).await?;
    Ok(Json(json!({ "enquiry": enquiry })))
}

/// Move an enquiry along the pipeline
///
/// PUT /api/enquiries/{id}/status
/// Body: { "status": "approved", "adminNotes": "...", "expectedStatus": "contacted" }
/// Returns the payment link and token while the enquiry is approved.
async fn update_status(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> AppResult<Json<Value>> {
    let outcome = state.engine.update_enquiry_status(&caller.user, &id, update).await?;
    Ok(Json(json!({
        "message": format!("Enquiry marked as {}", outcome.enquiry.status.label()),
        "enquiry": outcome.enquiry,
        "paymentToken": outcome.payment_token,
        "paymentLink": outcome.payment_link,
    })))
}

/// Resolve a payment link for the public payment page
///
/// GET /api/enquiries/payment/{token}
async fn resolve_payment_token(State(state): State<AppState>, Path(token): Path<String>) -> AppResult<Json<Value>> {
    let details = state.engine.resolve_by_payment_token(&token).await?;
    Ok(Json(json!({ "enquiry": details })))
}
