//! Session issuance: login, refresh token rotation, logout and password reset.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::db::{Database, User};
use crate::jwt::{JwtConfig, JwtError, now_secs};
use crate::notify::ResetNotifier;
use crate::password::{generate_secret, hash_password, validate_password, verify_password};

/// Default lifetime of a password reset token: 1 hour
pub const RESET_TOKEN_DURATION_SECS: u64 = 60 * 60;

const RESET_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug)]
pub enum SessionError {
    /// Unknown email, wrong password or inactive account
    AuthFailed,
    /// Refresh token expired, invalid, unknown, spent, or its user is gone
    RefreshFailed,
    ResetTokenInvalid,
    PasswordMismatch,
    WeakPassword(Vec<String>),
    Database(sqlx::Error),
    Token(JwtError),
    Hash(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AuthFailed => write!(f, "Invalid email or password"),
            SessionError::RefreshFailed => write!(f, "Invalid or expired refresh token"),
            SessionError::ResetTokenInvalid => write!(f, "Invalid or expired reset token"),
            SessionError::PasswordMismatch => write!(f, "Passwords do not match"),
            SessionError::WeakPassword(_) => write!(f, "Password does not meet requirements"),
            SessionError::Database(e) => write!(f, "Database error: {}", e),
            SessionError::Token(e) => write!(f, "Token error: {}", e),
            SessionError::Hash(e) => write!(f, "Password hashing failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<sqlx::Error> for SessionError {
    fn from(e: sqlx::Error) -> Self {
        SessionError::Database(e)
    }
}

impl From<JwtError> for SessionError {
    fn from(e: JwtError) -> Self {
        SessionError::Token(e)
    }
}

/// Reset tokens are stored as their SHA-256 digest.
fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Argon2 runs on the blocking pool so it does not stall the runtime.
async fn hash_blocking(password: String) -> Result<String, SessionError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| SessionError::Hash(e.to_string()))?
        .map_err(|e| SessionError::Hash(e.to_string()))
}

async fn verify_blocking(password: String, password_hash: String) -> Result<bool, SessionError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(|e| SessionError::Hash(e.to_string()))
}

#[derive(Clone)]
pub struct SessionIssuer {
    db: Database,
    jwt: Arc<JwtConfig>,
    reset_ttl: u64,
    notifier: Arc<dyn ResetNotifier>,
    /// Verified against when the email is unknown, so every login attempt
    /// costs one Argon2 verification.
    dummy_hash: Arc<OnceCell<String>>,
}

impl SessionIssuer {
    pub fn new(
        db: Database,
        jwt: Arc<JwtConfig>,
        reset_ttl: u64,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        Self {
            db,
            jwt,
            reset_ttl,
            notifier,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Verify credentials and start a session.
    pub async fn issue(&self, credentials: &Credentials) -> Result<TokenPair, SessionError> {
        let Some(user) = self.db.users().get_by_email(&credentials.email).await? else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| hash_blocking(generate_secret(RESET_TOKEN_LENGTH)))
                .await?;
            verify_blocking(credentials.password.clone(), dummy.clone()).await?;
            debug!("Login attempt for unknown email");
            return Err(SessionError::AuthFailed);
        };

        let valid = verify_blocking(credentials.password.clone(), user.password_hash.clone()).await?;
        if !valid {
            debug!(user = %user.uuid, "Login attempt with wrong password");
            return Err(SessionError::AuthFailed);
        }

        if !user.active {
            debug!(user = %user.uuid, "Login attempt for inactive account");
            return Err(SessionError::AuthFailed);
        }

        let pair = self.issue_for(&user).await?;
        info!(user = %user.uuid, "User logged in");
        Ok(pair)
    }

    async fn issue_for(&self, user: &User) -> Result<TokenPair, SessionError> {
        let access = self.jwt.generate_access_token(&user.uuid)?;
        let refresh = self.jwt.generate_refresh_token(&user.uuid)?;

        self.db
            .tokens()
            .create(&refresh.jti, user.id, refresh.issued_at, refresh.expires_at)
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is spent.
    ///
    /// Presenting a token that was already exchanged or revoked revokes every
    /// refresh token of its user.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let claims = self.jwt.validate_refresh_token(refresh_token).map_err(|e| {
            debug!(error = %e, "Refresh token rejected");
            SessionError::RefreshFailed
        })?;

        let tokens = self.db.tokens();
        let record = tokens
            .get_by_jti(&claims.jti)
            .await?
            .ok_or(SessionError::RefreshFailed)?;

        if record.is_spent() {
            warn!(user = %claims.sub, "Refresh token reuse detected, revoking all sessions");
            tokens.revoke_all_by_user(record.user_id, now_secs()?).await?;
            return Err(SessionError::RefreshFailed);
        }

        let user = self
            .db
            .users()
            .get_by_id(record.user_id)
            .await?
            .filter(|u| u.active && u.uuid == claims.sub)
            .ok_or(SessionError::RefreshFailed)?;

        let access = self.jwt.generate_access_token(&user.uuid)?;
        let refresh = self.jwt.generate_refresh_token(&user.uuid)?;

        let rotated = tokens
            .rotate(
                &claims.jti,
                &refresh.jti,
                user.id,
                refresh.issued_at,
                refresh.expires_at,
            )
            .await?;
        if !rotated {
            debug!(user = %user.uuid, "Refresh token was exchanged concurrently");
            return Err(SessionError::RefreshFailed);
        }

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// End a session. Unknown, expired or malformed tokens are ignored.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), SessionError> {
        let Ok(claims) = self.jwt.validate_refresh_token(refresh_token) else {
            return Ok(());
        };
        if self.db.tokens().delete_by_jti(&claims.jti).await? {
            info!(user = %claims.sub, "User logged out");
        }
        Ok(())
    }

    /// Issue a reset token if the email belongs to an active account.
    /// The outcome is the same whether or not the account exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), SessionError> {
        let Some(user) = self.db.users().get_by_email(email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };
        if !user.active {
            debug!(user = %user.uuid, "Password reset requested for inactive account");
            return Ok(());
        }

        let token = generate_secret(RESET_TOKEN_LENGTH);
        let expires_at = now_secs()? + self.reset_ttl;

        self.db
            .users()
            .set_reset_token(user.id, &hash_reset_token(&token), expires_at)
            .await?;
        self.notifier.send_reset(&user, &token, expires_at);
        Ok(())
    }

    /// Look up the user a reset token belongs to, without consuming it.
    pub async fn verify_reset_token(&self, token: &str) -> Result<Option<User>, SessionError> {
        let user = self
            .db
            .users()
            .get_by_reset_token(&hash_reset_token(token), now_secs()?)
            .await?;
        Ok(user)
    }

    /// Consume a reset token and set the new password.
    /// All refresh tokens of the user are revoked on success.
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), SessionError> {
        if request.password != request.confirm_password {
            return Err(SessionError::PasswordMismatch);
        }
        validate_password(&request.password).map_err(SessionError::WeakPassword)?;

        let password_hash = hash_blocking(request.password.clone()).await?;
        let now = now_secs()?;

        let user_id = self
            .db
            .users()
            .consume_reset_token(&hash_reset_token(&request.token), now, &password_hash)
            .await?
            .ok_or(SessionError::ResetTokenInvalid)?;

        let revoked = self.db.tokens().revoke_all_by_user(user_id, now).await?;
        info!(user_id, revoked, "Password reset completed");
        Ok(())
    }
}
