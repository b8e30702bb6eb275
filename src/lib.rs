/// Academy: enquiry-to-enrollment admissions service
///
/// This library provides the admissions workflow behind the academy
/// front-end: enquiry intake, admin approval with payment links, atomic
/// payment redemption into enrollments, and progress tracking.

// Core configuration and setup
pub mod config;

// Domain and HTTP error type
pub mod error;

// SQLite pool and schema
pub mod database;

// Course catalog - persistence and hot-reload registry
pub mod catalog;

// Users, bearer sessions and OTP codes
pub mod accounts;

// Outbound notifications (email/OTP dispatch seam)
pub mod notify;

// Enquiry -> payment -> enrollment workflow
pub mod enrollment;

// Admin reports
pub mod reports;

// HTTP API layer - REST endpoints under /api
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use catalog::Course;
pub use enrollment::{Enquiry, EnquiryStatus, Enrollment, EnrollmentEngine};
pub use error::{AppError, AppResult};
pub use server::{build_app, create_app, start_server};
