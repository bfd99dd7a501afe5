pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod notify;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::Router;
use axum::http::HeaderName;
use db::Database;
use jwt::JwtConfig;
use notify::ResetNotifier;
use rate_limit::RateLimitConfig;
use session::SessionIssuer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Base path for the application (e.g., "/desk")
    pub base: Option<String>,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_token_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: u64,
    /// Password reset token lifetime in seconds
    pub reset_token_ttl: u64,
    /// Whether to rate limit login and password reset requests
    pub rate_limit: bool,
    /// Header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<HeaderName>,
    /// Delivery of password reset links
    pub notifier: Arc<dyn ResetNotifier>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_ttls(
        &config.jwt_secret,
        config.access_token_ttl,
        config.refresh_token_ttl,
    ));

    let sessions = SessionIssuer::new(
        config.db.clone(),
        jwt.clone(),
        config.reset_token_ttl,
        config.notifier.clone(),
    );

    let rate_limit = config
        .rate_limit
        .then(|| Arc::new(RateLimitConfig::new(config.ip_header.clone())));

    let api_router = create_api_router(config.db.clone(), jwt, sessions, rate_limit);

    let base_path = config.base.as_deref().unwrap_or("");
    Router::new().nest(&format!("{}/api", base_path), api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
