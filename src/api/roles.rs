use axum::{Router, extract::State, middleware, response::IntoResponse, routing::get};
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use super::success;
use crate::auth::guard::ReadRoles;
use crate::auth::{Authorize, require_identity};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct RolesState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(RolesState);

pub fn router(state: RolesState) -> Router {
    Router::new()
        .route("/", get(list_roles))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity::<RolesState>,
        ))
        .with_state(state)
}

async fn list_roles(
    State(state): State<RolesState>,
    _auth: Authorize<ReadRoles>,
) -> Result<impl IntoResponse, ApiError> {
    let roles = state.db.roles().list().await.db_err("Failed to list roles")?;
    Ok(success(roles))
}
