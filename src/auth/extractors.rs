//! Request authentication: middleware and axum extractors.

use std::marker::PhantomData;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::guard::{PermissionConstraint, can_access_action};
use super::header::bearer_token;
use super::state::HasAuthBackend;
use super::types::Identity;
use crate::db::Database;

/// Load a user and expand their roles into an `Identity`.
pub async fn load_identity(db: &Database, uuid: &str) -> Result<Option<Identity>, sqlx::Error> {
    let Some(user) = db.users().get_by_uuid(uuid).await? else {
        return Ok(None);
    };
    let roles = db.roles().for_user(user.id).await?;

    Ok(Some(Identity {
        id: user.id,
        uuid: user.uuid,
        username: user.username,
        email: user.email,
        active: user.active,
        roles,
    }))
}

/// Core authentication logic shared by the middleware and the extractors.
///
/// Every call reads the user and their roles from the store, so role and
/// active-flag changes apply to the next request.
pub async fn authenticate_request<S>(headers: &HeaderMap, state: &S) -> Result<Identity, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = bearer_token(headers).ok_or(AuthErrorKind::TokenMissing)?;

    let claims = state.jwt().validate_access_token(token).map_err(|e| {
        debug!(error = %e, "Access token rejected");
        if e.is_expired() {
            AuthErrorKind::TokenExpired
        } else {
            AuthErrorKind::TokenInvalid
        }
    })?;

    let identity = load_identity(state.db(), &claims.sub)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load user");
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::UserInactiveOrMissing)?;

    if !identity.active {
        debug!(user = %identity.uuid, "Rejected request from inactive user");
        return Err(AuthErrorKind::UserInactiveOrMissing);
    }

    Ok(identity)
}

/// Middleware for protected routers: authenticates the request and stores the
/// `Identity` in the request extensions for downstream extractors.
pub async fn require_identity<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError>
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let identity = authenticate_request(request.headers(), &state).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Extractor for handlers that need the authenticated identity.
/// Uses the identity attached by `require_identity`, or authenticates itself.
pub struct Authenticated(pub Identity);

impl<S> FromRequestParts<S> for Authenticated
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(Authenticated(identity.clone()));
        }
        authenticate_request(&parts.headers, state)
            .await
            .map(Authenticated)
            .map_err(ApiAuthError::from)
    }
}

/// Extractor that requires the permission described by `C`.
/// Rejects with 403 if the identity lacks it.
pub struct Authorize<C>(pub Identity, PhantomData<C>);

impl<C> Authorize<C> {
    pub fn identity(&self) -> &Identity {
        &self.0
    }

    pub fn into_identity(self) -> Identity {
        self.0
    }
}

impl<S, C> FromRequestParts<S> for Authorize<C>
where
    S: HasAuthBackend + Send + Sync,
    C: PermissionConstraint + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(identity) = Authenticated::from_request_parts(parts, state).await?;

        if !can_access_action(&identity, C::RESOURCE, C::ACTION) {
            debug!(
                user = %identity.uuid,
                resource = C::RESOURCE,
                action = %C::ACTION,
                "Permission denied"
            );
            return Err(AuthErrorKind::PermissionDenied.into());
        }

        Ok(Authorize(identity, PhantomData))
    }
}
