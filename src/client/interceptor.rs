//! API client that attaches the access token to every request and refreshes
//! the session when the server rejects it.
//!
//! Any number of requests failing with 401 at the same time share one
//! refresh call. The first one performs it; the others wait on a one-shot
//! channel and replay with the token it publishes. A replayed request is
//! never refreshed again.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::error::ClientError;
use super::session::SessionContext;
use super::transport::{ClientRequest, ClientResponse, TokensData, Transport};
use crate::auth::{Action, Identity, guard};
use crate::session::TokenPair;

/// Paths whose 401 responses must not trigger a refresh.
const EXEMPT_PATHS: [&str; 2] = ["/auth/login", "/auth/refresh"];

const UNAUTHORIZED: u16 = 401;

pub type LoginRequiredHook = Box<dyn Fn() + Send + Sync>;

enum RefreshState {
    Idle,
    /// A refresh call is in flight; waiters receive the new access token,
    /// or None if the refresh failed.
    Refreshing {
        waiters: Vec<oneshot::Sender<Option<String>>>,
    },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn take_waiters(state: &Mutex<RefreshState>) -> Vec<oneshot::Sender<Option<String>>> {
    match std::mem::replace(&mut *lock(state), RefreshState::Idle) {
        RefreshState::Refreshing { waiters } => waiters,
        RefreshState::Idle => Vec::new(),
    }
}

/// Held by the request performing the refresh. If that request is dropped
/// mid-flight, the state returns to idle and the waiters' channels close.
struct RefreshLeader<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl RefreshLeader<'_> {
    fn settle(mut self) -> Vec<oneshot::Sender<Option<String>>> {
        self.settled = true;
        take_waiters(self.state)
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if !self.settled {
            take_waiters(self.state);
        }
    }
}

fn is_exempt(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    EXEMPT_PATHS.iter().any(|exempt| path.ends_with(exempt))
}

#[derive(Deserialize)]
struct ProfileData {
    user: Identity,
}

pub struct AuthClient {
    transport: Arc<dyn Transport>,
    api_prefix: String,
    session: Mutex<SessionContext>,
    refresh: Mutex<RefreshState>,
    on_login_required: Option<LoginRequiredHook>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            api_prefix: "/api".to_string(),
            session: Mutex::new(SessionContext::default()),
            refresh: Mutex::new(RefreshState::Idle),
            on_login_required: None,
        }
    }

    /// Prefix of every API path (default `/api`).
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Called once each time a refresh fails and the user has to log in again.
    pub fn on_login_required(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_login_required = Some(Box::new(hook));
        self
    }

    fn path(&self, path: &str) -> String {
        format!("{}{}", self.api_prefix, path)
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.session).access_token().map(str::to_owned)
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        lock(&self.session).tokens().cloned()
    }

    pub fn identity(&self) -> Option<Identity> {
        lock(&self.session).identity().cloned()
    }

    pub fn is_logged_in(&self) -> bool {
        lock(&self.session).is_active()
    }

    /// Resume a session from a previously stored token pair.
    pub fn restore_session(&self, tokens: TokenPair) {
        lock(&self.session).set_tokens(tokens);
    }

    /// Log in and load the profile of the new session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ClientError> {
        let request = ClientRequest::post(
            self.path("/auth/login"),
            json!({ "email": email, "password": password }),
        );
        let data: TokensData = self.send(request).await?.into_data()?;
        lock(&self.session).set_tokens(data.tokens);

        let identity = self.load_profile().await?;
        info!(user = %identity.uuid, "Logged in");
        Ok(identity)
    }

    /// End the session locally and revoke its refresh token on the server.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let refresh_token = {
            let mut session = lock(&self.session);
            let token = session.refresh_token().map(str::to_owned);
            session.clear();
            token
        };
        let Some(refresh_token) = refresh_token else {
            return Ok(());
        };

        let request = ClientRequest::post(
            self.path("/auth/logout"),
            json!({ "refreshToken": refresh_token }),
        );
        self.transport.send(request).await?.ensure_success()
    }

    /// Fetch the current identity and cache it in the session.
    pub async fn load_profile(&self) -> Result<Identity, ClientError> {
        let data: ProfileData = self
            .send(ClientRequest::get(self.path("/auth/me")))
            .await?
            .into_data()?;
        lock(&self.session).set_identity(data.user.clone());
        Ok(data.user)
    }

    /// Whether the cached identity may perform `action` on `resource`.
    pub fn can_access_action(&self, resource: &str, action: Action) -> bool {
        lock(&self.session)
            .identity()
            .is_some_and(|identity| guard::can_access_action(identity, resource, action))
    }

    /// Gate navigation to a view that needs `action` on `resource`.
    pub fn guard_route(&self, resource: &str, action: Action) -> Result<(), ClientError> {
        let session = lock(&self.session);
        let identity = session.identity().ok_or(ClientError::NotAuthenticated)?;
        if guard::can_access_action(identity, resource, action) {
            Ok(())
        } else {
            Err(ClientError::PermissionDenied)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(ClientRequest::get(self.path(path)))
            .await?
            .into_data()
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let request = ClientRequest::post(self.path(path), serde_json::to_value(body)?);
        self.send(request).await?.into_data()
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let request = ClientRequest::new(reqwest::Method::PUT, self.path(path))
            .with_body(serde_json::to_value(body)?);
        self.send(request).await?.into_data()
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.send(ClientRequest::new(reqwest::Method::DELETE, self.path(path)))
            .await?
            .ensure_success()
    }

    /// Send a request with the current access token.
    ///
    /// A 401 from a non-exempt path is answered by refreshing the session
    /// (or joining a refresh already in flight) and replaying the request
    /// once. Every other response is returned unchanged, including the
    /// response to the replay.
    pub async fn send(&self, mut request: ClientRequest) -> Result<ClientResponse, ClientError> {
        let sent_token = self.access_token();
        request.bearer = sent_token.clone();

        let response = self.transport.send(request.clone()).await?;
        if response.status != UNAUTHORIZED || is_exempt(&request.path) {
            return Ok(response);
        }
        let Some(sent_token) = sent_token else {
            return Ok(response);
        };

        let token = self.refresh_access_token(&sent_token).await?;

        debug!(path = %request.path, "Replaying request with new access token");
        request.bearer = Some(token);
        self.transport.send(request).await
    }

    /// Obtain a new access token to replace `sent_token`, sharing one
    /// refresh call between all callers.
    async fn refresh_access_token(&self, sent_token: &str) -> Result<String, ClientError> {
        let waiter = {
            let mut state = lock(&self.refresh);
            if let RefreshState::Refreshing { waiters } = &mut *state {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Some(rx)
            } else {
                // A leader publishes its tokens before going idle, so reading
                // the session under this lock sees every finished refresh.
                match self.access_token() {
                    // Refreshed while this request was in flight
                    Some(current) if current != sent_token => return Ok(current),
                    // Cleared by a failed refresh or a logout
                    None => return Err(ClientError::RefreshFailed),
                    Some(_) => {}
                }
                *state = RefreshState::Refreshing {
                    waiters: Vec::new(),
                };
                None
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(Some(token)) => Ok(token),
                _ => Err(ClientError::RefreshFailed),
            };
        }

        let leader = RefreshLeader {
            state: &self.refresh,
            settled: false,
        };

        match self.request_new_tokens().await {
            Ok(tokens) => {
                let access_token = tokens.access_token.clone();
                // Publish the tokens before going idle so that late 401s see them
                lock(&self.session).set_tokens(tokens);
                let waiters = leader.settle();
                debug!(waiters = waiters.len(), "Session refreshed");
                for waiter in waiters {
                    let _ = waiter.send(Some(access_token.clone()));
                }
                Ok(access_token)
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                lock(&self.session).clear();
                for waiter in leader.settle() {
                    let _ = waiter.send(None);
                }
                if let Some(hook) = &self.on_login_required {
                    hook();
                }
                Err(ClientError::RefreshFailed)
            }
        }
    }

    async fn request_new_tokens(&self) -> Result<TokenPair, ClientError> {
        let refresh_token = lock(&self.session)
            .refresh_token()
            .map(str::to_owned)
            .ok_or(ClientError::NotAuthenticated)?;

        let request = ClientRequest::post(
            self.path("/auth/refresh"),
            json!({ "refreshToken": refresh_token }),
        );
        let data: TokensData = self.transport.send(request).await?.into_data()?;
        Ok(data.tokens)
    }
}
