/// Enrollment Workflow Layer
///
/// The enquiry -> approval -> payment -> enrollment pipeline:
/// - Type definitions (Enquiry, Enrollment, PaymentDetails)
/// - The status transition table
/// - Payment token minting
/// - SQLite persistence with compare-and-swap status writes
/// - The engine tying them together

// Enquiry and enrollment type definitions
pub mod types;

// Which status moves are legal, and who may make them
pub mod transitions;

// Payment token capability
pub mod token;

// SQLite persistence for enquiries and enrollments
pub mod storage;

// Workflow engine
pub mod engine;

pub use engine::EnrollmentEngine;
pub use storage::WorkflowStorage;
pub use types::{
    Enquiry, EnquiryStatus, Enrollment, EnrollmentWithCourse, NewEnquiry, PaymentDetails, PaymentMethod,
    PaymentRedemption, RedemptionOutcome, StatusUpdate, StatusUpdateOutcome,
};
