/// Registration, sign-in and bearer-session resolution
///
/// Sign-in paths (password, registration OTP, login OTP) all end in
/// `start_session`, which hands the raw token to the caller and keeps only
/// its digest.

use crate::{
    accounts::{
        credentials::{generate_otp, hash_password, random_token, sha256_hex, verify_password},
        storage::AccountStorage,
        types::{mask_email, normalize_email, AuthSession, OtpPurpose, Role, User},
    },
    config::AuthConfig,
    error::{AppError, AppResult},
    notify::{Dispatcher, Notification},
};
use chrono::{Duration, Utc};
use serde::Serialize;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPending {
    pub requires_verification: bool,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpSent {
    /// Masked address, e.g. "a***@example.com"
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AccountService {
    storage: AccountStorage,
    dispatcher: Dispatcher,
    config: AuthConfig,
}

impl AccountService {
    pub fn new(storage: AccountStorage, dispatcher: Dispatcher, config: AuthConfig) -> Self {
        Self { storage, dispatcher, config }
    }

    pub fn storage(&self) -> &AccountStorage {
        &self.storage
    }

    /// Create (or refresh) an unverified account and mail a registration code
    pub async fn register(&self, name: &str, email: &str, password: &str) -> AppResult<RegistrationPending> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let password_hash = hash_password(password)?;
        match self.storage.find_user_by_email(&email).await? {
            Some(existing) if existing.email_verified => {
                return Err(AppError::Conflict("An account with this email already exists".to_string()));
            }
            Some(existing) => {
                tracing::debug!("🔁 Refreshing unverified registration for {}", mask_email(&email));
                self.storage.update_unverified_user(&existing.id, name, &password_hash).await?;
            }
            None => {
                let user = self
                    .storage
                    .insert_user(name, &email, Some(&password_hash), false, Role::User)
                    .await?;
                tracing::info!("👤 Registered user {} (pending verification)", user.id);
            }
        }

        self.issue_otp(&email, OtpPurpose::Registration).await?;

        Ok(RegistrationPending {
            requires_verification: true,
            email,
            message: "Verification code sent to your email".to_string(),
        })
    }

    pub async fn verify_registration(&self, email: &str, otp: &str) -> AppResult<AuthSession> {
        let email = normalize_email(email)?;
        let user = self
            .storage
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

        self.check_otp(&email, OtpPurpose::Registration, otp).await?;

        if !user.email_verified {
            self.storage.mark_verified(&user.id).await?;
            tracing::info!("✅ Email verified for user {}", user.id);
        }

        let user = User { email_verified: true, ..user };
        self.start_session(user).await
    }

    pub async fn resend_verification(&self, email: &str) -> AppResult<OtpSent> {
        let email = normalize_email(email)?;
        let user = self
            .storage
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound("Account".to_string()))?;
        if user.email_verified {
            return Err(AppError::Conflict("Email is already verified".to_string()));
        }

        self.issue_otp(&email, OtpPurpose::Registration).await?;
        Ok(OtpSent {
            email: mask_email(&email),
            message: "Verification code resent".to_string(),
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let email = normalize_email(email)?;
        let user = match self.storage.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                tracing::warn!("🔒 Login attempt for unknown account {}", mask_email(&email));
                return Err(AppError::Unauthenticated);
            }
        };

        let password_ok = user
            .password_hash
            .as_deref()
            .is_some_and(|stored| verify_password(password, stored));
        if !password_ok {
            tracing::warn!("🔒 Wrong password for user {}", user.id);
            return Err(AppError::Unauthenticated);
        }
        if !user.email_verified {
            return Err(AppError::Forbidden(format!("user {} has not verified their email", user.id)));
        }

        self.start_session(user).await
    }

    /// Mail a login code. Unknown or unverified addresses get the same answer, but no code.
    pub async fn send_login_otp(&self, email: &str) -> AppResult<OtpSent> {
        let email = normalize_email(email)?;
        match self.storage.find_user_by_email(&email).await? {
            Some(user) if user.email_verified => self.issue_otp(&email, OtpPurpose::Login).await?,
            _ => tracing::debug!("🔍 Login OTP requested for non-eligible address {}", mask_email(&email)),
        }

        Ok(OtpSent {
            email: mask_email(&email),
            message: "If an account exists, a login code has been sent".to_string(),
        })
    }

    pub async fn verify_login_otp(&self, email: &str, otp: &str) -> AppResult<AuthSession> {
        let email = normalize_email(email)?;
        self.check_otp(&email, OtpPurpose::Login, otp).await?;

        let user = self
            .storage
            .find_user_by_email(&email)
            .await?
            .filter(|user| user.email_verified)
            .ok_or(AppError::Unauthenticated)?;
        self.start_session(user).await
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        self.storage.delete_session(&sha256_hex(token)).await?;
        Ok(())
    }

    /// Resolve a bearer token to its user, re-reading the role from storage
    pub async fn authenticate(&self, token: &str) -> AppResult<User> {
        self.storage
            .find_session_user(&sha256_hex(token), Utc::now())
            .await?
            .ok_or(AppError::Unauthenticated)
    }

    /// Create the configured admin account if it does not exist yet
    pub async fn ensure_admin(&self, email: &str, password: &str, name: &str) -> AppResult<()> {
        let email = normalize_email(email)?;
        match self.storage.find_user_by_email(&email).await? {
            Some(user) if user.is_admin() => {
                tracing::debug!("👑 Bootstrap admin already present: {}", user.id);
            }
            Some(user) => {
                tracing::warn!("⚠️ Bootstrap admin email belongs to non-admin user {}; leaving it unchanged", user.id);
            }
            None => {
                let password_hash = hash_password(password)?;
                let user = self
                    .storage
                    .insert_user(name, &email, Some(&password_hash), true, Role::Admin)
                    .await?;
                tracing::info!("👑 Created bootstrap admin {}", user.id);
            }
        }
        Ok(())
    }

    async fn issue_otp(&self, email: &str, purpose: OtpPurpose) -> AppResult<()> {
        let code = generate_otp();
        let expires_at = Utc::now() + Duration::minutes(self.config.otp_ttl_minutes);
        self.storage.upsert_otp(email, purpose, &sha256_hex(&code), expires_at).await?;

        self.dispatcher.dispatch(Notification::Otp {
            email: email.to_string(),
            purpose: purpose.as_str().to_string(),
            code,
        });
        tracing::info!("🔑 Issued {} code for {}", purpose.as_str(), mask_email(email));
        Ok(())
    }

    async fn check_otp(&self, email: &str, purpose: OtpPurpose, otp: &str) -> AppResult<()> {
        let otp = otp.trim();
        if otp.len() != 6 || !otp.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation("Please enter the 6-digit code".to_string()));
        }

        let consumed = self
            .storage
            .consume_otp(email, purpose, &sha256_hex(otp), Utc::now(), self.config.otp_max_attempts)
            .await?;
        if !consumed {
            tracing::warn!("🔒 Rejected {} code for {}", purpose.as_str(), mask_email(email));
            return Err(AppError::Validation("Invalid or expired verification code".to_string()));
        }
        Ok(())
    }

    async fn start_session(&self, user: User) -> AppResult<AuthSession> {
        let token = random_token(32);
        let expires_at = Utc::now() + Duration::hours(self.config.session_ttl_hours);
        self.storage.create_session(&user.id, &sha256_hex(&token), expires_at).await?;

        tracing::info!("🔓 Session started for user {} ({})", user.id, user.role);
        Ok(AuthSession { token, user })
    }
}
