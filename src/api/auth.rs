//! Session endpoints: login, refresh, logout, profile and password reset.

use axum::{
    Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ApiJson};
use super::{success, success_message};
use crate::auth::Authenticated;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_forgot_password, rate_limit_login};
use crate::session::{Credentials, ResetPasswordRequest, SessionIssuer, TokenPair};

/// Returned for every forgot-password request, whether or not the email exists.
const RESET_REQUESTED_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent";

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub sessions: SessionIssuer,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState, rate_limit: Option<Arc<RateLimitConfig>>) -> Router {
    let mut login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone());
    let mut forgot_router = Router::new()
        .route("/forgot-password", post(forgot_password))
        .with_state(state.clone());

    if let Some(config) = rate_limit {
        login_router =
            login_router.layer(middleware::from_fn_with_state(config.clone(), rate_limit_login));
        forgot_router = forgot_router.layer(middleware::from_fn_with_state(
            config,
            rate_limit_forgot_password,
        ));
    }

    let router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/reset-password", post(reset_password))
        .route("/reset-password/{token}", get(verify_reset_token))
        .with_state(state);

    router.merge(login_router).merge(forgot_router)
}

#[derive(Serialize)]
struct TokensData {
    tokens: TokenPair,
}

async fn login(
    State(state): State<AuthState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.sessions.issue(&credentials).await?;
    Ok(success(TokensData { tokens }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.sessions.refresh(&payload.refresh_token).await?;
    Ok(success(TokensData { tokens }))
}

async fn logout(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.revoke(&payload.refresh_token).await?;
    Ok(success_message("Logged out"))
}

#[derive(Serialize)]
struct MeData {
    user: crate::auth::Identity,
}

async fn me(Authenticated(identity): Authenticated) -> impl IntoResponse {
    success(MeData { user: identity })
}

#[derive(Deserialize)]
struct ForgotPasswordRequest {
    email: String,
}

async fn forgot_password(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    state.sessions.request_password_reset(email).await?;
    Ok(success_message(RESET_REQUESTED_MESSAGE))
}

#[derive(Serialize)]
struct ResetUser {
    email: String,
    username: String,
}

#[derive(Serialize)]
struct VerifyResetData {
    valid: bool,
    user: ResetUser,
}

async fn verify_reset_token(
    State(state): State<AuthState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .sessions
        .verify_reset_token(&token)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    Ok(success(VerifyResetData {
        valid: true,
        user: ResetUser {
            email: user.email,
            username: user.username,
        },
    }))
}

async fn reset_password(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.reset_password(&payload).await?;
    Ok(success_message("Password has been reset"))
}
