mod auth;
mod error;
mod roles;
mod tickets;
mod users;

use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionIssuer;

pub use error::{ApiError, ApiJson, ResultExt, validate_uuid};

/// Success envelope shared by all endpoints: `{success: true, data?, message?}`.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

pub fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        message: None,
    })
}

pub fn success_message(message: &'static str) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        data: None,
        message: Some(message),
    })
}

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    sessions: SessionIssuer,
    rate_limit: Option<Arc<RateLimitConfig>>,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        jwt: jwt.clone(),
        sessions,
    };

    let tickets_state = tickets::TicketsState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let roles_state = roles::RolesState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let users_state = users::UsersState { db, jwt };

    Router::new()
        .nest("/auth", auth::router(auth_state, rate_limit))
        .nest("/tickets", tickets::router(tickets_state))
        .nest("/users", users::router(users_state))
        .nest("/roles", roles::router(roles_state))
}
