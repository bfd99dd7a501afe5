#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use taskdesk::{
    ServerConfig, create_app,
    db::{Database, User},
    notify::ResetNotifier,
    password::hash_password,
    session::TokenPair,
};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const PASSWORD: &str = "correct horse battery";

/// Records every reset token instead of delivering it.
#[derive(Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl CapturingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| e == email)
            .map(|(_, token)| token.clone())
    }
}

impl ResetNotifier for CapturingNotifier {
    fn send_reset(&self, user: &User, token: &str, _expires_at: u64) {
        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), token.to_string()));
    }
}

/// Builder for test setup with various options
pub struct TestSetup {
    base: Option<String>,
    access_token_ttl: u64,
    rate_limit: bool,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            base: None,
            access_token_ttl: 300,
            rate_limit: false,
        }
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn with_access_ttl(mut self, secs: u64) -> Self {
        self.access_token_ttl = secs;
        self
    }

    pub fn with_rate_limit(mut self) -> Self {
        self.rate_limit = true;
        self
    }

    async fn config(&self) -> (ServerConfig, Arc<CapturingNotifier>) {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let notifier = Arc::new(CapturingNotifier::default());
        let config = ServerConfig {
            base: self.base.clone(),
            db,
            jwt_secret: JWT_SECRET.to_vec(),
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: 3600,
            reset_token_ttl: 3600,
            rate_limit: self.rate_limit,
            ip_header: None,
            notifier: notifier.clone(),
        };
        (config, notifier)
    }

    /// Build the router for in-process requests.
    pub async fn build(self) -> TestApp {
        let (config, notifier) = self.config().await;
        TestApp {
            router: create_app(&config),
            db: config.db.clone(),
            notifier,
            prefix: format!("{}/api", self.base.as_deref().unwrap_or("")),
        }
    }

    /// Start a real server on a random port.
    pub async fn serve(self) -> TestServer {
        let (config, notifier) = self.config().await;
        let db = config.db.clone();
        let (handle, addr) = taskdesk::start_server(config, 0)
            .await
            .expect("Failed to start server");
        TestServer {
            base_url: format!("http://{}", addr),
            db,
            notifier,
            handle,
        }
    }
}

pub struct TestServer {
    pub base_url: String,
    pub db: Database,
    pub notifier: Arc<CapturingNotifier>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub notifier: Arc<CapturingNotifier>,
    prefix: String,
}

pub async fn setup() -> TestApp {
    TestSetup::new().build().await
}

fn build_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn into_parts(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

impl TestApp {
    /// Send a request to `{base}/api{path}` and return the status and JSON body.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let uri = format!("{}{}", self.prefix, path);
        self.send(build_request(method, &uri, token, body)).await
    }

    /// Like `request`, but as if the connection came from `addr`.
    pub async fn request_from(
        &self,
        addr: SocketAddr,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let uri = format!("{}{}", self.prefix, path);
        let mut request = build_request(method, &uri, None, body);
        request.extensions_mut().insert(ConnectInfo(addr));
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        into_parts(response).await
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.request("GET", path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", path, token, Some(body)).await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("PUT", path, Some(token), Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.request("DELETE", path, Some(token), None).await
    }

    /// Log in and return the issued token pair.
    pub async fn login(&self, email: &str, password: &str) -> TokenPair {
        let (status, json) = self
            .post(
                "/auth/login",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", json);
        serde_json::from_value(json["data"]["tokens"].clone()).unwrap()
    }

    pub async fn refresh(&self, refresh_token: &str) -> (StatusCode, Value) {
        self.post(
            "/auth/refresh",
            None,
            serde_json::json!({ "refreshToken": refresh_token }),
        )
        .await
    }

    /// Create a user with the given roles and log them in.
    pub async fn user_with_roles(&self, email: &str, roles: &[&str]) -> (String, TokenPair) {
        let uuid = create_user(&self.db, email, PASSWORD, roles).await;
        let tokens = self.login(email, PASSWORD).await;
        (uuid, tokens)
    }
}

/// Insert an active user directly into the store. Returns the user's UUID.
pub async fn create_user(db: &Database, email: &str, password: &str, roles: &[&str]) -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    let username = email.split('@').next().unwrap_or(email);
    let hash = hash_password(password).unwrap();
    let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    db.users()
        .create_with_roles(&uuid, email, username, &hash, &roles)
        .await
        .unwrap()
        .expect("unknown role");
    uuid
}
