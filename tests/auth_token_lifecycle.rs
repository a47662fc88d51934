use axum_test::TestServer;
use rollbookd::{api, db, seed};
use serde_json::{json, Value};
use tempfile::TempDir;

fn test_server() -> (TestServer, TempDir) {
    let workspace = TempDir::new().expect("temp workspace");
    let conn = db::open_db(workspace.path()).expect("open db");
    seed::seed_sample(&conn).expect("seed sample data");
    let server = TestServer::new(api::router(api::AppState::new(conn))).expect("test server");
    (server, workspace)
}

async fn login(server: &TestServer, email: &str, password: &str) -> String {
    let res = server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn login_returns_token_and_embedded_role() {
    let (server, _ws) = test_server();
    let res = server
        .post("/api/auth/login")
        .json(&json!({ "email": "admin@example.com", "password": "password" }))
        .await;
    res.assert_status_ok();

    let body: Value = res.json();
    let token = body["token"].as_str().expect("token");
    assert!(token.contains('|'), "token is id|secret, got {}", token);
    assert_eq!(body["user"]["email"], "admin@example.com");
    assert_eq!(body["user"]["role"]["name"], "Admin");
    assert_eq!(body["user"]["role"]["permissions"][0], "*");
    assert!(
        body["user"].get("password_hash").is_none(),
        "password hash must never be serialized"
    );
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() {
    let (server, _ws) = test_server();
    let res = server
        .post("/api/auth/login")
        .json(&json!({ "email": "admin@example.com", "password": "nope" }))
        .await;
    res.assert_status_unauthorized();
    let body: Value = res.json();
    assert_eq!(body["message"], "Invalid login details");
}

#[tokio::test]
async fn login_with_missing_fields_is_a_validation_error() {
    let (server, _ws) = test_server();
    let res = server
        .post("/api/auth/login")
        .json(&json!({ "email": "not-an-email" }))
        .await;
    res.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json();
    assert_eq!(body["message"], "The given data was invalid.");
    assert!(body["errors"]["email"].is_array());
    assert!(body["errors"]["password"].is_array());
}

#[tokio::test]
async fn me_requires_a_bearer_token() {
    let (server, _ws) = test_server();
    let res = server.get("/api/users/me").await;
    res.assert_status_unauthorized();
    let body: Value = res.json();
    assert_eq!(body["message"], "Unauthenticated.");

    let res = server
        .get("/api/users/me")
        .authorization_bearer("garbage-token")
        .await;
    res.assert_status_unauthorized();
}

#[tokio::test]
async fn me_returns_the_current_user() {
    let (server, _ws) = test_server();
    let token = login(&server, "teacher1@example.com", "password").await;
    let res = server.get("/api/users/me").authorization_bearer(&token).await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["email"], "teacher1@example.com");
    assert_eq!(body["role"]["name"], "Teacher");
}

#[tokio::test]
async fn refresh_rotates_and_revokes_the_current_token() {
    let (server, _ws) = test_server();
    let old_token = login(&server, "admin@example.com", "password").await;

    let res = server
        .post("/api/auth/refresh")
        .authorization_bearer(&old_token)
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    let new_token = body["token"].as_str().expect("rotated token").to_string();
    assert_ne!(new_token, old_token);

    // The old token is gone, the new one works.
    let res = server
        .get("/api/users/me")
        .authorization_bearer(&old_token)
        .await;
    res.assert_status_unauthorized();
    let res = server
        .get("/api/users/me")
        .authorization_bearer(&new_token)
        .await;
    res.assert_status_ok();
}

#[tokio::test]
async fn refresh_without_a_token_is_rejected() {
    let (server, _ws) = test_server();
    let res = server.post("/api/auth/refresh").await;
    res.assert_status_unauthorized();
}
