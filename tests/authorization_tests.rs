mod common;

use axum::http::StatusCode;
use common::{TestApp, setup};
use serde_json::json;

async fn create_ticket(app: &TestApp, token: &str, title: &str) -> String {
    let (status, json) = app
        .post("/tickets", Some(token), json!({ "title": title }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json["data"]["uuid"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_viewer_can_read_but_not_write() {
    let app = setup().await;
    let (_, viewer) = app.user_with_roles("viewer@example.com", &["viewer"]).await;

    let (status, _) = app.get("/tickets", &viewer.access_token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = app
        .post(
            "/tickets",
            Some(&viewer.access_token),
            json!({ "title": "Broken printer" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Insufficient permissions");
}

#[tokio::test]
async fn test_member_cannot_delete() {
    let app = setup().await;
    let (_, member) = app.user_with_roles("member@example.com", &["member"]).await;
    let ticket = create_ticket(&app, &member.access_token, "Broken printer").await;

    let (status, _) = app
        .put(
            &format!("/tickets/{}", ticket),
            &member.access_token,
            json!({ "status": "in_progress" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = app
        .delete(&format!("/tickets/{}", ticket), &member.access_token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Insufficient permissions");
}

#[tokio::test]
async fn test_user_without_roles_is_denied() {
    let app = setup().await;
    let (_, tokens) = app.user_with_roles("nobody@example.com", &[]).await;

    let (status, _) = app.get("/tickets", &tokens.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Authentication alone is enough for the profile
    let (status, _) = app.get("/auth/me", &tokens.access_token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_role_change_applies_to_next_request() {
    let app = setup().await;
    let (uuid, member) = app.user_with_roles("member@example.com", &["member"]).await;
    let ticket = create_ticket(&app, &member.access_token, "Broken printer").await;

    let user = app.db.users().get_by_uuid(&uuid).await.unwrap().unwrap();
    app.db
        .roles()
        .set_user_roles(user.id, &["admin".to_string()])
        .await
        .unwrap();

    // Same access token, new permissions
    let (status, _) = app
        .delete(&format!("/tickets/{}", ticket), &member.access_token)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    app.db
        .roles()
        .set_user_roles(user.id, &["viewer".to_string()])
        .await
        .unwrap();

    let (status, _) = app
        .post(
            "/tickets",
            Some(&member.access_token),
            json!({ "title": "Another" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ticket_capability_flags() {
    let app = setup().await;
    let (_, admin) = app.user_with_roles("admin@example.com", &["admin"]).await;
    let (_, member) = app.user_with_roles("member@example.com", &["member"]).await;
    let (_, viewer) = app.user_with_roles("viewer@example.com", &["viewer"]).await;
    let ticket = create_ticket(&app, &admin.access_token, "Broken printer").await;

    let cases = [
        (&admin.access_token, true, true),
        (&member.access_token, true, false),
        (&viewer.access_token, false, false),
    ];

    for (token, can_update, can_delete) in cases {
        let (status, json) = app.get(&format!("/tickets/{}", ticket), token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["can_update"], can_update);
        assert_eq!(json["data"]["can_delete"], can_delete);

        let (_, json) = app.get("/tickets", token).await;
        assert_eq!(json["data"][0]["can_update"], can_update);
        assert_eq!(json["data"][0]["can_delete"], can_delete);
    }
}

#[tokio::test]
async fn test_user_administration_requires_admin() {
    let app = setup().await;
    let (_, member) = app.user_with_roles("member@example.com", &["member"]).await;
    let (_, admin) = app.user_with_roles("admin@example.com", &["admin"]).await;

    let (status, _) = app.get("/users", &member.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/roles", &member.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = app.get("/users", &admin.access_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let (status, json) = app.get("/roles", &admin.access_token).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"admin"));
    assert!(names.contains(&"member"));
    assert!(names.contains(&"viewer"));
}

#[tokio::test]
async fn test_admin_deactivates_user() {
    let app = setup().await;
    let (_, admin) = app.user_with_roles("admin@example.com", &["admin"]).await;
    let (member_uuid, member) = app.user_with_roles("member@example.com", &["member"]).await;

    let (status, _) = app
        .put(
            &format!("/users/{}/active", member_uuid),
            &admin.access_token,
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = app.get("/tickets", &member.access_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid token");

    let (status, _) = app
        .put(
            &format!("/users/{}/active", member_uuid),
            &admin.access_token,
            json!({ "active": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get("/tickets", &member.access_token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_changes_roles_over_api() {
    let app = setup().await;
    let (_, admin) = app.user_with_roles("admin@example.com", &["admin"]).await;
    let (viewer_uuid, viewer) = app.user_with_roles("viewer@example.com", &["viewer"]).await;

    let (status, json) = app
        .put(
            &format!("/users/{}/roles", viewer_uuid),
            &admin.access_token,
            json!({ "roles": ["member"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["name"], "member");

    let (status, _) = app
        .post(
            "/tickets",
            Some(&viewer.access_token),
            json!({ "title": "Now allowed" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = app
        .put(
            &format!("/users/{}/roles", viewer_uuid),
            &admin.access_token,
            json!({ "roles": ["superuser"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Unknown role"));
}

#[tokio::test]
async fn test_admin_cannot_deactivate_or_delete_self() {
    let app = setup().await;
    let (admin_uuid, admin) = app.user_with_roles("admin@example.com", &["admin"]).await;

    let (status, _) = app
        .put(
            &format!("/users/{}/active", admin_uuid),
            &admin.access_token,
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .delete(&format!("/users/{}", admin_uuid), &admin.access_token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
