/// Account endpoints and the bearer-session extractor
///
/// The role carried by a request is always the one stored server-side for
/// the session's user; nothing the client sends about itself is trusted.

use crate::{
    accounts::{
        service::{OtpSent, RegistrationPending},
        AuthSession, User,
    },
    api::AppState,
    error::{AppError, AppResult},
};
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Authenticated caller, resolved from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl AuthUser {
    pub fn require_admin(&self) -> AppResult<&User> {
        if self.user.is_admin() {
            Ok(&self.user)
        } else {
            Err(AppError::Forbidden(format!("user {} is not an admin", self.user.id)))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(AppError::Unauthenticated);
        };
        let user = state.accounts.authenticate(token).await?;
        Ok(AuthUser { user, token: token.to_string() })
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-registration", post(verify_registration))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/login", post(login))
        .route("/auth/send-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// Register a new (unverified) account
///
/// POST /api/auth/register
/// Body: { "name": "...", "email": "...", "password": "..." }
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegistrationPending>)> {
    let pending = state
        .accounts
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(pending)))
}

/// POST /api/auth/verify-registration
async fn verify_registration(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequest>,
) -> AppResult<Json<AuthSession>> {
    let session = state.accounts.verify_registration(&payload.email, &payload.otp).await?;
    Ok(Json(session))
}

/// POST /api/auth/resend-verification
async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<OtpSent>> {
    Ok(Json(state.accounts.resend_verification(&payload.email).await?))
}

/// Password sign-in
///
/// POST /api/auth/login
/// Returns: { "token": "...", "user": { ... } }
async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<Json<AuthSession>> {
    let session = state.accounts.login(&payload.email, &payload.password).await?;
    Ok(Json(session))
}

/// Mail a login code. Unknown addresses get the same answer.
///
/// POST /api/auth/send-otp
async fn send_otp(State(state): State<AppState>, Json(payload): Json<EmailRequest>) -> AppResult<Json<OtpSent>> {
    Ok(Json(state.accounts.send_login_otp(&payload.email).await?))
}

/// POST /api/auth/verify-otp
async fn verify_otp(State(state): State<AppState>, Json(payload): Json<OtpRequest>) -> AppResult<Json<AuthSession>> {
    let session = state.accounts.verify_login_otp(&payload.email, &payload.otp).await?;
    Ok(Json(session))
}

/// Revoke the caller's session
///
/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, caller: AuthUser) -> AppResult<Json<Value>> {
    state.accounts.logout(&caller.token).await?;
    tracing::info!("👋 User {} signed out", caller.user.id);
    Ok(Json(json!({ "message": "Logged out" })))
}

/// GET /api/auth/me
async fn me(caller: AuthUser) -> Json<Value> {
    Json(json!({ "user": caller.user }))
}
