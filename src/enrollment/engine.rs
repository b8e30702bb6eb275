/// Enrollment workflow engine
///
/// Owns the enquiry lifecycle, payment-token issuance and redemption, and
/// enrollment creation. Every operation re-checks the caller's role itself;
/// handlers only pass along the authenticated user.

use crate::{
    accounts::{
        credentials::{hash_password, temporary_password},
        storage::{find_user_by_email_on, insert_user},
        types::{normalize_email, Role, User},
    },
    catalog::{CatalogRegistry, Course},
    config::WorkflowConfig,
    enrollment::{
        storage::{StatusWrite, WorkflowStorage},
        token::{is_well_formed, mint_payment_token, token_prefix},
        transitions::{self, Trigger},
        types::{
            Enquiry, EnquiryStatus, Enrollment, EnrollmentWithCourse, NewEnquiry, PaymentDetails,
            PaymentMethod, PaymentRedemption, RedemptionOutcome, StatusUpdate, StatusUpdateOutcome,
        },
    },
    error::{AppError, AppResult},
    notify::{Dispatcher, Notification},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[derive(Debug)]
pub struct EnrollmentEngine {
    storage: WorkflowStorage,
    catalog: Arc<CatalogRegistry>,
    dispatcher: Dispatcher,
    config: WorkflowConfig,
}

fn require_admin(actor: &User) -> AppResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("user {} is not an admin", actor.id)))
    }
}

fn token_is_live(enquiry: &Enquiry, now: DateTime<Utc>) -> bool {
    enquiry.payment_token.is_some()
        && enquiry.status.accepts_payment()
        && enquiry.payment_token_expires_at.is_some_and(|expires| expires > now)
}

impl EnrollmentEngine {
    pub fn new(
        storage: WorkflowStorage,
        catalog: Arc<CatalogRegistry>,
        dispatcher: Dispatcher,
        config: WorkflowConfig,
    ) -> Self {
        Self { storage, catalog, dispatcher, config }
    }

    pub fn payment_link(&self, token: &str) -> String {
        self.config.payment_link(token)
    }

    /// Record a new enquiry in state `new` and alert the admin channel.
    /// Duplicate submissions create duplicate enquiries.
    pub async fn submit_enquiry(&self, input: NewEnquiry) -> AppResult<Enquiry> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        let email = normalize_email(&input.email)?;

        let course = self.resolve_course_ref(input.course_id.as_deref(), input.course.as_deref())?;
        let course_title = match (&course, input.course.as_deref().map(str::trim)) {
            (Some(course), _) => course.title.clone(),
            (None, Some(free_text)) => free_text.to_string(),
            (None, None) => String::new(),
        };

        let now = Utc::now();
        let enquiry = Enquiry {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            phone: input.phone.trim().to_string(),
            course_id: course.map(|c| c.id),
            course_title,
            message: input.message.trim().to_string(),
            status: EnquiryStatus::New,
            admin_notes: String::new(),
            payment_token: None,
            payment_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_enquiry(&enquiry).await?;

        tracing::info!(
            "📝 Enquiry {} submitted for '{}' (catalog match: {})",
            enquiry.id,
            enquiry.course_title,
            enquiry.course_id.is_some()
        );
        self.dispatcher.dispatch(Notification::EnquiryReceived {
            enquiry_id: enquiry.id.clone(),
            name: enquiry.name.clone(),
            email: enquiry.email.clone(),
            course_title: enquiry.course_title.clone(),
        });

        Ok(enquiry)
    }

    /// Course id wins over free text; free text is matched against catalog titles
    fn resolve_course_ref(&self, course_id: Option<&str>, course: Option<&str>) -> AppResult<Option<Course>> {
        if let Some(id) = course_id.map(str::trim).filter(|id| !id.is_empty()) {
            return self
                .catalog
                .get_course(id)
                .map(Some)
                .ok_or_else(|| AppError::Validation(format!("Unknown course id '{id}'")));
        }
        let Some(reference) = course.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        Ok(self
            .catalog
            .get_course(reference)
            .or_else(|| self.catalog.find_by_title(reference)))
    }

    pub async fn list_enquiries(&self, actor: &User, status: Option<EnquiryStatus>) -> AppResult<Vec<Enquiry>> {
        require_admin(actor)?;
        self.storage.list_enquiries(status).await
    }

    pub async fn get_enquiry(&self, actor: &User, enquiry_id: &str) -> AppResult<Enquiry> {
        require_admin(actor)?;
        self.load_enquiry(enquiry_id).await
    }

    async fn load_enquiry(&self, enquiry_id: &str) -> AppResult<Enquiry> {
        self.storage
            .get_enquiry(enquiry_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Enquiry".to_string()))
    }

    /// Admin status change, conditioned on the status read (and on
    /// `expected_status` when the caller sends one). Moving into `approved`
    /// mints a payment token, or re-uses the live one on re-approval. A
    /// `payment_sent` enquiry goes back to `approved` only once its token expired.
    pub async fn update_enquiry_status(
        &self,
        actor: &User,
        enquiry_id: &str,
        update: StatusUpdate,
    ) -> AppResult<StatusUpdateOutcome> {
        require_admin(actor)?;
        let current = self.load_enquiry(enquiry_id).await?;

        if let Some(expected) = update.expected_status {
            if expected != current.status {
                tracing::warn!(
                    "⚔️ Stale status update on enquiry {}: expected {}, found {}",
                    enquiry_id,
                    expected,
                    current.status
                );
                return Err(AppError::Conflict(format!(
                    "Enquiry is now {}, not {}",
                    current.status.label(),
                    expected.label()
                )));
            }
        }

        transitions::check(current.status, update.status, Trigger::Admin)?;

        let now = Utc::now();
        // Re-approval out of payment_sent only re-issues a dead link
        if current.status == EnquiryStatus::PaymentSent
            && update.status == EnquiryStatus::Approved
            && token_is_live(&current, now)
        {
            return Err(AppError::Conflict(
                "Invalid status transition: the payment link is still valid".to_string(),
            ));
        }

        let linked_course = match update.course_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                if !matches!(current.status, EnquiryStatus::New | EnquiryStatus::Contacted) {
                    return Err(AppError::Conflict(format!(
                        "Course can no longer be changed on a {} enquiry",
                        current.status.label()
                    )));
                }
                let course = self
                    .catalog
                    .get_course(id)
                    .ok_or_else(|| AppError::Validation(format!("Unknown course id '{id}'")))?;
                Some(course)
            }
            None => None,
        };

        let minted = if update.status == EnquiryStatus::Approved {
            if current.course_id.is_none() && linked_course.is_none() {
                return Err(AppError::Validation(
                    "Link the enquiry to a catalog course before approving it".to_string(),
                ));
            }
            self.issue_payment_token(&current, now)
        } else {
            None
        };

        let notes = update.admin_notes.as_deref().map(str::trim);
        let write = StatusWrite {
            enquiry_id,
            expected_status: current.status,
            expected_token: current.payment_token.as_deref(),
            new_status: update.status,
            admin_notes: notes,
            course: linked_course.as_ref().map(|c| (c.id.as_str(), c.title.as_str())),
            new_token: minted.as_ref().map(|(token, expires)| (token.as_str(), *expires)),
            now,
        };
        if !self.storage.compare_and_set_status(&write).await? {
            tracing::warn!("⚔️ Lost status race on enquiry {} ({} -> {})", enquiry_id, current.status, update.status);
            return Err(AppError::Conflict("Enquiry was changed by someone else".to_string()));
        }

        let enquiry = self.load_enquiry(enquiry_id).await?;
        tracing::info!("🔀 Enquiry {} moved {} -> {} by {}", enquiry.id, current.status, enquiry.status, actor.id);

        let (payment_token, payment_link) = match (&enquiry.status, &enquiry.payment_token) {
            (EnquiryStatus::Approved, Some(token)) => (Some(token.clone()), Some(self.payment_link(token))),
            _ => (None, None),
        };

        if let Some((token, _)) = &minted {
            tracing::info!("💳 Payment token {}… issued for enquiry {}", token_prefix(token), enquiry.id);
        }
        if let Some(link) = &payment_link {
            self.dispatcher.dispatch(Notification::PaymentLink {
                email: enquiry.email.clone(),
                name: enquiry.name.clone(),
                course_title: enquiry.course_title.clone(),
                link: link.clone(),
            });
        }

        Ok(StatusUpdateOutcome { enquiry, payment_token, payment_link })
    }

    /// Token to bind on approval: None re-uses the enquiry's live token,
    /// Some is a fresh token (first approval, or the old one expired).
    fn issue_payment_token(&self, enquiry: &Enquiry, now: DateTime<Utc>) -> Option<(String, DateTime<Utc>)> {
        if token_is_live(enquiry, now) {
            tracing::debug!("♻️ Re-using live payment token for enquiry {}", enquiry.id);
            return None;
        }
        let expires_at = now + Duration::hours(self.config.payment_token_ttl_hours);
        Some((mint_payment_token(), expires_at))
    }

    /// Public payment page lookup. Redeemed, closed, expired and unknown
    /// tokens are all reported the same way.
    pub async fn resolve_by_payment_token(&self, token: &str) -> AppResult<PaymentDetails> {
        let token = token.trim();
        if !is_well_formed(token) {
            return Err(AppError::InvalidToken);
        }

        let now = Utc::now();
        let enquiry = match self.storage.find_by_payment_token(token).await? {
            Some(enquiry) if token_is_live(&enquiry, now) => enquiry,
            _ => {
                tracing::debug!("🔍 Payment token {}… is not redeemable", token_prefix(token));
                return Err(AppError::InvalidToken);
            }
        };

        let course = enquiry
            .course_id
            .as_deref()
            .and_then(|id| self.catalog.get_course(id))
            .ok_or(AppError::InvalidToken)?;

        Ok(PaymentDetails {
            id: enquiry.id,
            name: enquiry.name,
            email: enquiry.email,
            phone: enquiry.phone,
            status: enquiry.status,
            course,
            expires_at: enquiry.payment_token_expires_at.unwrap_or(now),
        })
    }

    /// Redeem a payment token: claim it, resolve or provision the student's
    /// account and create the enrollment, all in one transaction. At most one
    /// enrollment can ever come out of one token.
    pub async fn redeem_payment(&self, request: PaymentRedemption) -> AppResult<RedemptionOutcome> {
        let token = request.payment_token.trim();
        if !is_well_formed(token) {
            return Err(AppError::InvalidToken);
        }
        let method: PaymentMethod = request.payment_method.parse().map_err(AppError::Validation)?;

        let now = Utc::now();
        let enquiry = match self.storage.find_by_payment_token(token).await? {
            Some(enquiry) if token_is_live(&enquiry, now) => enquiry,
            _ => {
                tracing::warn!("🚫 Redemption with dead payment token {}…", token_prefix(token));
                return Err(AppError::InvalidToken);
            }
        };

        let email = if request.user_email.trim().is_empty() {
            enquiry.email.clone()
        } else {
            normalize_email(&request.user_email)?
        };
        if email != enquiry.email {
            return Err(AppError::Validation(
                "Payment link was issued for a different email address".to_string(),
            ));
        }
        let name = match request.user_name.trim() {
            "" => enquiry.name.clone(),
            given => given.to_string(),
        };
        let course_title = enquiry.course_title.clone();

        let password = temporary_password();
        let password_hash = hash_password(&password)?;

        let mut tx = self.storage.pool().begin().await?;

        let Some(claimed) = WorkflowStorage::claim_payment_token(&mut *tx, token, now).await? else {
            tracing::warn!("⚔️ Payment token {}… was claimed concurrently", token_prefix(token));
            return Err(AppError::InvalidToken);
        };
        transitions::check(enquiry.status, EnquiryStatus::Enrolled, Trigger::PaymentRedemption)?;

        let course_id = claimed
            .course_id
            .ok_or_else(|| AppError::Conflict("Enquiry has no course to enroll in".to_string()))?;
        let fee = WorkflowStorage::course_fee(&mut *tx, &course_id)
            .await?
            .ok_or_else(|| AppError::Conflict("Course is no longer offered".to_string()))?;

        let (user, account_created) = match find_user_by_email_on(&mut *tx, &claimed.email).await? {
            Some(user) => (user, false),
            None => {
                let user = insert_user(&mut *tx, &name, &claimed.email, Some(&password_hash), true, Role::User).await?;
                (user, true)
            }
        };

        let enrollment = Enrollment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            course_id,
            enquiry_id: Some(claimed.id.clone()),
            progress: 0,
            completed: false,
            payment_method: method,
            amount_paid: fee,
            created_at: now,
            updated_at: now,
        };
        WorkflowStorage::insert_enrollment(&mut *tx, &enrollment).await?;

        tx.commit().await?;

        tracing::info!(
            "🎓 Enquiry {} redeemed via {}: enrollment {} for user {} (new account: {})",
            claimed.id,
            method.as_str(),
            enrollment.id,
            user.id,
            account_created
        );

        if account_created {
            self.dispatcher.dispatch(Notification::AccountProvisioned {
                email: user.email.clone(),
                name: user.name.clone(),
                temporary_password: password,
            });
        }
        self.dispatcher.dispatch(Notification::EnrollmentConfirmed {
            email: user.email.clone(),
            name: user.name.clone(),
            course_title,
            enrollment_id: enrollment.id.clone(),
        });

        Ok(RedemptionOutcome {
            enrollment,
            user_id: user.id,
            account_created,
        })
    }

    /// Authenticated enroll without an enquiry. Repeat enrollments in the
    /// same course are allowed.
    pub async fn enroll_direct(&self, actor: &User, course_id: &str, method: &str) -> AppResult<Enrollment> {
        let method: PaymentMethod = method.parse().map_err(AppError::Validation)?;
        let course = self
            .catalog
            .get_course(course_id.trim())
            .ok_or_else(|| AppError::NotFound("Course".to_string()))?;

        let now = Utc::now();
        let enrollment = Enrollment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: actor.id.clone(),
            course_id: course.id.clone(),
            enquiry_id: None,
            progress: 0,
            completed: false,
            payment_method: method,
            amount_paid: course.fee,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.storage.pool().acquire().await?;
        WorkflowStorage::insert_enrollment(&mut *conn, &enrollment).await?;

        tracing::info!("🎓 User {} enrolled directly in course {} ({})", actor.id, course.id, enrollment.id);
        self.dispatcher.dispatch(Notification::EnrollmentConfirmed {
            email: actor.email.clone(),
            name: actor.name.clone(),
            course_title: course.title,
            enrollment_id: enrollment.id.clone(),
        });
        Ok(enrollment)
    }

    pub async fn my_enrollments(&self, actor: &User) -> AppResult<Vec<EnrollmentWithCourse>> {
        let enrollments = self.storage.list_user_enrollments(&actor.id).await?;
        Ok(enrollments
            .into_iter()
            .map(|enrollment| EnrollmentWithCourse {
                course: self.catalog.get_course(&enrollment.course_id),
                enrollment,
            })
            .collect())
    }

    /// Most recent enrollment of the caller in a course, if any
    pub async fn enrollment_status(&self, actor: &User, course_id: &str) -> AppResult<Option<Enrollment>> {
        let enrollments = self.storage.list_user_enrollments(&actor.id).await?;
        Ok(enrollments.into_iter().find(|e| e.course_id == course_id))
    }

    /// Set progress on an enrollment the caller owns (admins may update any).
    /// Out-of-range values are rejected and leave the stored value alone.
    pub async fn update_progress(&self, actor: &User, enrollment_id: &str, progress: i64) -> AppResult<Enrollment> {
        if !(0..=100).contains(&progress) {
            return Err(AppError::Validation("Progress must be between 0 and 100".to_string()));
        }

        let enrollment = self
            .storage
            .get_enrollment(enrollment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Enrollment".to_string()))?;
        if enrollment.user_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(format!(
                "user {} does not own enrollment {}",
                actor.id, enrollment_id
            )));
        }

        let now = Utc::now();
        if !self.storage.update_progress(enrollment_id, progress, now).await? {
            return Err(AppError::NotFound("Enrollment".to_string()));
        }
        tracing::debug!("📈 Enrollment {} progress {} -> {}", enrollment_id, enrollment.progress, progress);

        Ok(Enrollment {
            progress,
            completed: progress >= 100,
            updated_at: now,
            ..enrollment
        })
    }
}
