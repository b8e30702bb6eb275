/// Enquiry and enrollment type definitions

use crate::catalog::Course;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Position of an enquiry in the admission pipeline
///
/// new -> contacted -> approved -> payment_sent -> enrolled, with closed
/// reachable from every state except enrolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnquiryStatus {
    New,
    Contacted,
    Approved,
    PaymentSent,
    Enrolled,
    Closed,
}

impl EnquiryStatus {
    pub const ALL: [EnquiryStatus; 6] = [
        EnquiryStatus::New,
        EnquiryStatus::Contacted,
        EnquiryStatus::Approved,
        EnquiryStatus::PaymentSent,
        EnquiryStatus::Enrolled,
        EnquiryStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryStatus::New => "new",
            EnquiryStatus::Contacted => "contacted",
            EnquiryStatus::Approved => "approved",
            EnquiryStatus::PaymentSent => "payment_sent",
            EnquiryStatus::Enrolled => "enrolled",
            EnquiryStatus::Closed => "closed",
        }
    }

    /// Human form, e.g. "payment sent"
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnquiryStatus::Enrolled | EnquiryStatus::Closed)
    }

    /// States in which the payment token may be redeemed
    pub fn accepts_payment(&self) -> bool {
        matches!(self, EnquiryStatus::Approved | EnquiryStatus::PaymentSent)
    }
}

impl fmt::Display for EnquiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnquiryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnquiryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown enquiry status '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enquiry {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Catalog course, when the reference could be resolved
    pub course_id: Option<String>,
    /// Title as shown to admins (catalog title or the free text submitted)
    pub course_title: String,
    pub message: String,
    pub status: EnquiryStatus,
    pub admin_notes: String,
    pub payment_token: Option<String>,
    pub payment_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public enquiry form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewEnquiry {
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Course title or id as typed/selected on the form
    pub course: Option<String>,
    pub course_id: Option<String>,
    pub message: String,
}

/// Admin status change
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: EnquiryStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
    /// Optimistic concurrency guard: the status the admin last saw
    #[serde(default)]
    pub expected_status: Option<EnquiryStatus>,
    /// Link (or re-link) a catalog course before the enquiry is approved
    #[serde(default)]
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateOutcome {
    pub enquiry: Enquiry,
    /// Present when the enquiry is (or stays) approved
    pub payment_token: Option<String>,
    pub payment_link: Option<String>,
}

/// What the public payment page needs to render
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: EnquiryStatus,
    pub course: Course,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Upi,
    Netbanking,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "upi" => Ok(PaymentMethod::Upi),
            "netbanking" => Ok(PaymentMethod::Netbanking),
            "wallet" => Ok(PaymentMethod::Wallet),
            other => Err(format!("unsupported payment method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub enquiry_id: Option<String>,
    /// 0..=100
    pub progress: i64,
    pub completed: bool,
    pub payment_method: PaymentMethod,
    pub amount_paid: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enrollment plus the course it grants, for "my courses"
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentWithCourse {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: Option<Course>,
}

/// Public payment form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRedemption {
    pub payment_token: String,
    pub payment_method: String,
    pub user_email: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionOutcome {
    pub enrollment: Enrollment,
    pub user_id: String,
    pub account_created: bool,
}
