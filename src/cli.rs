//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::{Database, is_unique_violation};
use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS};
use crate::notify::LogResetNotifier;
use crate::password::{generate_secret, hash_password};
use crate::session::RESET_TOKEN_DURATION_SECS;
use axum::http::HeaderName;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const GENERATED_PASSWORD_LENGTH: usize = 20;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "taskdesk", about = "Ticket tracker with token-based authentication")]
pub struct Args {
    /// Base path prefix. The API is served at {base}/api
    #[arg(short, long, value_parser = validate_base_path)]
    pub base: Option<String>,

    /// Port to listen on
    #[arg(short, long, default_value = "7292")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "taskdesk.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "TASKDESK_ACCESS_TOKEN_TTL", default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "TASKDESK_REFRESH_TOKEN_TTL", default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_token_ttl: u64,

    /// Password reset token lifetime in seconds
    #[arg(long, env = "TASKDESK_RESET_TOKEN_TTL", default_value_t = RESET_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub reset_token_ttl: u64,

    /// Public URL of the application, used in password reset links
    #[arg(long, default_value = "http://localhost:7292")]
    pub public_url: String,

    /// Read the client IP from this header (e.g. X-Forwarded-For). Only use behind a proxy
    #[arg(long, value_parser = parse_header_name)]
    pub ip_header: Option<HeaderName>,

    /// Disable rate limiting of login and password reset requests
    #[arg(long)]
    pub no_rate_limit: bool,

    /// Create an admin user with this email on startup and print its password
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_base_path(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Ok(String::new());
    }

    if !s.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Base path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Base path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

fn parse_header_name(s: &str) -> Result<HeaderName, String> {
    HeaderName::try_from(s).map_err(|e| format!("Invalid header name {}: {}", s, e))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("public-url must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Handle the --create-admin flag: create an admin account with a random password.
pub async fn handle_create_admin(db: &Database, email: &str) {
    let password = generate_secret(GENERATED_PASSWORD_LENGTH);
    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash admin password");
            std::process::exit(1);
        }
    };

    let uuid = Uuid::new_v4().to_string();
    let username = email.split('@').next().unwrap_or(email);

    let admin = ["admin".to_string()];
    match db
        .users()
        .create_with_roles(&uuid, email, username, &password_hash, &admin)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            error!("Admin role is missing from the database");
            std::process::exit(1);
        }
        Err(e) if is_unique_violation(&e) => {
            println!();
            println!("A user with email {} already exists", email);
            println!();
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            std::process::exit(1);
        }
    }

    println!();
    println!("Admin user created: {}", email);
    println!("Password: {}", password);
    println!();
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    jwt_secret: String,
    public_url: Url,
) -> ServerConfig {
    let notifier = LogResetNotifier::new(public_url, args.base.as_deref());

    ServerConfig {
        base: args.base.clone(),
        db,
        jwt_secret: jwt_secret.into_bytes(),
        access_token_ttl: args.access_token_ttl,
        refresh_token_ttl: args.refresh_token_ttl,
        reset_token_ttl: args.reset_token_ttl,
        rate_limit: !args.no_rate_limit,
        ip_header: args.ip_header.clone(),
        notifier: Arc::new(notifier),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
