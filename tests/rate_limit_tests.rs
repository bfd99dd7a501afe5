mod common;

use axum::http::StatusCode;
use common::TestSetup;
use serde_json::json;
use std::net::SocketAddr;

fn addr(ip: &str) -> SocketAddr {
    format!("{}:50000", ip).parse().unwrap()
}

#[tokio::test]
async fn test_forgot_password_rate_limited_per_ip() {
    let app = TestSetup::new().with_rate_limit().build().await;
    let body = json!({ "email": "nobody@example.com" });

    for _ in 0..3 {
        let (status, _) = app
            .request_from(addr("10.0.0.1"), "POST", "/auth/forgot-password", Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = app
        .request_from(addr("10.0.0.1"), "POST", "/auth/forgot-password", Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        json["error"],
        "Too many password reset requests. Please try again later."
    );

    // Other clients keep their own budget
    let (status, _) = app
        .request_from(addr("10.0.0.2"), "POST", "/auth/forgot-password", Some(body))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_rate_limited() {
    let app = TestSetup::new().with_rate_limit().build().await;
    let body = json!({ "email": "nobody@example.com", "password": "whatever" });

    let mut statuses = Vec::new();
    for _ in 0..10 {
        let (status, _) = app
            .request_from(addr("10.0.0.1"), "POST", "/auth/login", Some(body.clone()))
            .await;
        statuses.push(status);
    }

    assert!(statuses[..5].iter().all(|s| *s == StatusCode::UNAUTHORIZED));
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_other_endpoints_not_rate_limited() {
    let app = TestSetup::new().with_rate_limit().build().await;

    for _ in 0..10 {
        let (status, _) = app
            .request_from(
                addr("10.0.0.1"),
                "POST",
                "/auth/refresh",
                Some(json!({ "refreshToken": "garbage" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_unknown_client_ip_rejected() {
    let app = TestSetup::new().with_rate_limit().build().await;

    let (status, json) = app
        .post(
            "/auth/login",
            None,
            json!({ "email": "nobody@example.com", "password": "whatever" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Unable to determine client IP");
}
