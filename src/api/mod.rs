/// HTTP API Layer
///
/// REST endpoints consumed by the academy front-end. Everything here is
/// mounted under `/api`:
/// - Account registration, sign-in and sessions
/// - Course catalog CRUD
/// - Enquiry intake and admin status changes
/// - Payment redemption and enrollment tracking
/// - Admin reports

use crate::{
    accounts::AccountService, catalog::CatalogRegistry, enrollment::EnrollmentEngine, reports::ReportService,
};
use axum::Router;
use std::sync::Arc;

// Bearer-session extractor and /auth endpoints
pub mod auth;

// Course catalog endpoints
pub mod courses;

// Enquiry intake, status changes and payment-link lookup
pub mod enquiries;

// Payment redemption, direct enrollment and progress
pub mod enrollments;

// Admin reporting endpoints
pub mod reports;

pub use auth::AuthUser;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Lock-free course snapshot for public reads
    pub catalog: Arc<CatalogRegistry>,
    pub accounts: AccountService,
    pub engine: Arc<EnrollmentEngine>,
    pub reports: ReportService,
}

/// All API routes, to be nested under `/api`
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::create_auth_routes())
        .merge(courses::create_course_routes())
        .merge(enquiries::create_enquiry_routes())
        .merge(enrollments::create_enrollment_routes())
        .merge(reports::create_report_routes())
}
