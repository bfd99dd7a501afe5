//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Internal auth error kind used by the core authentication logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No `Authorization: Bearer` header, or a malformed one
    TokenMissing,
    TokenExpired,
    TokenInvalid,
    UserInactiveOrMissing,
    PermissionDenied,
    DatabaseError,
}

/// API authentication errors (returns JSON).
#[derive(Debug)]
pub struct ApiAuthError(pub(super) AuthErrorKind);

impl ApiAuthError {
    pub fn kind(&self) -> AuthErrorKind {
        self.0
    }

    fn status_code(&self) -> StatusCode {
        match self.0 {
            AuthErrorKind::TokenMissing
            | AuthErrorKind::TokenExpired
            | AuthErrorKind::TokenInvalid
            | AuthErrorKind::UserInactiveOrMissing => StatusCode::UNAUTHORIZED,
            AuthErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            AuthErrorKind::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.0 {
            AuthErrorKind::TokenMissing => "token not provided",
            AuthErrorKind::TokenExpired => "token expired",
            AuthErrorKind::TokenInvalid | AuthErrorKind::UserInactiveOrMissing => "invalid token",
            AuthErrorKind::PermissionDenied => "Insufficient permissions",
            AuthErrorKind::DatabaseError => "Database error",
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self(kind)
    }
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
