//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and reset-mail flooding.

use axum::{
    extract::{Request, State},
    http::HeaderName,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::IpAddr, num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

const LOGIN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const FORGOT_PASSWORD_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Login: 5 requests burst, refilling 1 per second per IP
    pub login: Arc<IpLimiter>,
    /// Forgot password: 3 requests per minute per IP
    pub forgot_password: Arc<IpLimiter>,
    /// Header carrying the client IP when running behind a proxy
    pub ip_header: Option<HeaderName>,
}

impl RateLimitConfig {
    pub fn new(ip_header: Option<HeaderName>) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(LOGIN_PER_SEC).allow_burst(LOGIN_BURST),
            )),
            forgot_password: Arc::new(RateLimiter::keyed(Quota::per_minute(
                FORGOT_PASSWORD_PER_MIN,
            ))),
            ip_header,
        }
    }
}

async fn check(
    limiter: &IpLimiter,
    ip_header: Option<&HeaderName>,
    request: Request,
    next: Next,
    message: &'static str,
) -> Response {
    let ip = match extract_client_ip(&request, ip_header) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, "Unable to determine client IP");
            return ApiError::forbidden("Unable to determine client IP").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Rate limit exceeded");
            ApiError::too_many_requests(message).into_response()
        }
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.login,
        config.ip_header.as_ref(),
        request,
        next,
        "Too many login attempts. Please wait before trying again.",
    )
    .await
}

/// Middleware for rate limiting password reset requests.
pub async fn rate_limit_forgot_password(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.forgot_password,
        config.ip_header.as_ref(),
        request,
        next,
        "Too many password reset requests. Please try again later.",
    )
    .await
}
