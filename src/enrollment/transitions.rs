/// Enquiry status transition table
///
/// | from                 | to           | trigger            |
/// |----------------------|--------------|--------------------|
/// | new                  | contacted    | admin              |
/// | new, contacted       | approved     | admin (mints token)|
/// | approved             | approved     | admin (re-issue)   |
/// | payment_sent         | approved     | admin (token expired) |
/// | approved             | payment_sent | admin              |
/// | approved, payment_sent | enrolled   | payment redemption |
/// | any non-terminal     | closed       | admin              |

use crate::enrollment::types::EnquiryStatus;
use crate::error::{AppError, AppResult};

/// Who is driving a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Admin,
    PaymentRedemption,
}

pub fn is_allowed(from: EnquiryStatus, to: EnquiryStatus, trigger: Trigger) -> bool {
    use EnquiryStatus::*;

    match trigger {
        Trigger::Admin => matches!(
            (from, to),
            (New, Contacted)
                | (New, Approved)
                | (Contacted, Approved)
                | (Approved, Approved)
                | (Approved, PaymentSent)
                | (PaymentSent, Approved)
                | (New | Contacted | Approved | PaymentSent, Closed)
        ),
        Trigger::PaymentRedemption => matches!((from, to), (Approved | PaymentSent, Enrolled)),
    }
}

/// `Conflict` unless `from -> to` is a legal move for `trigger`
pub fn check(from: EnquiryStatus, to: EnquiryStatus, trigger: Trigger) -> AppResult<()> {
    if is_allowed(from, to, trigger) {
        return Ok(());
    }
    let reason = if to == EnquiryStatus::Enrolled && trigger == Trigger::Admin {
        "enrollment only happens through payment".to_string()
    } else if from.is_terminal() {
        format!("enquiry is already {from}")
    } else {
        format!("cannot move from {from} to {to}")
    };
    Err(AppError::Conflict(format!("Invalid status transition: {reason}")))
}
