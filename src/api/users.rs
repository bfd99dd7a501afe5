use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ApiJson, ResultExt, validate_uuid};
use super::success;
use crate::auth::guard::{CreateUsers, DeleteUsers, ReadUsers, UpdateUsers};
use crate::auth::{Authorize, Role, require_identity};
use crate::db::{Database, User, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::password::{hash_password, validate_password};

const MAX_USERNAME_LENGTH: usize = 64;
const MAX_EMAIL_LENGTH: usize = 254;
const DEFAULT_ROLE: &str = "member";

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{uuid}", delete(delete_user))
        .route("/{uuid}/active", put(set_active))
        .route("/{uuid}/roles", put(set_roles))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity::<UsersState>,
        ))
        .with_state(state)
}

async fn find_user(db: &Database, uuid: &str) -> Result<User, ApiError> {
    validate_uuid(uuid)?;
    db.users()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Authorize<ReadUsers>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(success(users))
}

#[derive(Deserialize)]
struct CreateUserRequest {
    email: String,
    username: String,
    password: String,
    roles: Option<Vec<String>>,
}

#[derive(Serialize)]
struct CreatedUser {
    uuid: String,
    email: String,
    username: String,
    roles: Vec<Role>,
}

async fn create_user(
    State(state): State<UsersState>,
    auth: Authorize<CreateUsers>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    let username = payload.username.trim();

    let mut details = Vec::new();
    if email.is_empty() || !email.contains('@') || email.len() > MAX_EMAIL_LENGTH {
        details.push("A valid email address is required".to_string());
    }
    if username.is_empty() {
        details.push("Username is required".to_string());
    } else if username.chars().count() > MAX_USERNAME_LENGTH {
        details.push(format!(
            "Username cannot be longer than {} characters",
            MAX_USERNAME_LENGTH
        ));
    }
    if let Err(password_details) = validate_password(&payload.password) {
        details.extend(password_details);
    }
    if !details.is_empty() {
        return Err(ApiError::validation("Invalid user", details));
    }

    let role_names = payload
        .roles
        .unwrap_or_else(|| vec![DEFAULT_ROLE.to_string()]);
    let known = state.db.roles().list().await.db_err("Failed to list roles")?;
    if let Some(unknown) = role_names
        .iter()
        .find(|name| !known.iter().any(|r| &r.name == *name))
    {
        return Err(ApiError::bad_request(format!("Unknown role: {}", unknown)));
    }

    let password = payload.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {}", e)))?
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {}", e)))?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let id = match state
        .db
        .users()
        .create_with_roles(&uuid, email, username, &password_hash, &role_names)
        .await
    {
        Ok(Some(id)) => id,
        Ok(None) => return Err(ApiError::bad_request("Unknown role")),
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::bad_request("Email is already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };
    let roles = state
        .db
        .roles()
        .for_user(id)
        .await
        .db_err("Failed to load roles")?;

    info!(by = %auth.identity().uuid, user = %uuid, "User created");
    Ok((
        StatusCode::CREATED,
        success(CreatedUser {
            uuid,
            email: email.to_string(),
            username: username.to_string(),
            roles,
        }),
    ))
}

#[derive(Deserialize)]
struct SetActiveRequest {
    active: bool,
}

async fn set_active(
    State(state): State<UsersState>,
    auth: Authorize<UpdateUsers>,
    Path(uuid): Path<String>,
    ApiJson(payload): ApiJson<SetActiveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = find_user(&state.db, &uuid).await?;
    if user.id == auth.identity().id && !payload.active {
        return Err(ApiError::bad_request("Cannot deactivate your own account"));
    }

    state
        .db
        .users()
        .set_active(user.id, payload.active)
        .await
        .db_err("Failed to update user")?;

    info!(by = %auth.identity().uuid, user = %uuid, active = payload.active, "User active flag changed");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SetRolesRequest {
    roles: Vec<String>,
}

async fn set_roles(
    State(state): State<UsersState>,
    auth: Authorize<UpdateUsers>,
    Path(uuid): Path<String>,
    ApiJson(payload): ApiJson<SetRolesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = find_user(&state.db, &uuid).await?;

    let changed = state
        .db
        .roles()
        .set_user_roles(user.id, &payload.roles)
        .await
        .db_err("Failed to update roles")?;
    if !changed {
        return Err(ApiError::bad_request("Unknown role"));
    }

    let roles = state
        .db
        .roles()
        .for_user(user.id)
        .await
        .db_err("Failed to load roles")?;

    info!(by = %auth.identity().uuid, user = %uuid, "User roles changed");
    Ok(success(roles))
}

async fn delete_user(
    State(state): State<UsersState>,
    auth: Authorize<DeleteUsers>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = find_user(&state.db, &uuid).await?;
    if user.id == auth.identity().id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }

    state
        .db
        .users()
        .delete(user.id)
        .await
        .db_err("Failed to delete user")?;

    info!(by = %auth.identity().uuid, user = %uuid, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
