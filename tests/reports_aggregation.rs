use axum_test::TestServer;
use chrono::{Days, Local};
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

async fn login(server: &TestServer, email: &str) -> String {
    let res = server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": "password" }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    body["token"].as_str().expect("token").to_string()
}

async fn seeded_section_id(server: &TestServer, token: &str) -> String {
    let res = server.get("/api/sections").authorization_bearer(token).await;
    res.assert_status_ok();
    let sections: Value = res.json();
    sections
        .as_array()
        .expect("sections array")
        .iter()
        .find(|s| s["teacher"]["email"] == "teacher1@example.com")
        .expect("seeded teacher section")["id"]
        .as_str()
        .expect("id")
        .to_string()
}

fn seeded_range() -> (String, String) {
    let today = Local::now().date_naive();
    let from = today.checked_sub_days(Days::new(6)).expect("date");
    (
        from.format("%Y-%m-%d").to_string(),
        today.format("%Y-%m-%d").to_string(),
    )
}

#[tokio::test]
async fn report_returns_rows_in_range_ordered_by_date() {
    let (server, _ws) = test_server();
    let token = login(&server, "admin@example.com").await;
    let section_id = seeded_section_id(&server, &token).await;
    let (from, to) = seeded_range();

    let res = server
        .get("/api/admin/attendance-report")
        .authorization_bearer(&token)
        .add_query_param("section_id", &section_id)
        .add_query_param("from", &from)
        .add_query_param("to", &to)
        .await;
    res.assert_status_ok();
    let report: Value = res.json();
    let rows = report.as_array().expect("report array");
    assert_eq!(rows.len(), 14, "two students, seven days");

    let dates: Vec<&str> = rows
        .iter()
        .map(|r| r["date"].as_str().expect("date"))
        .collect();
    let mut sorted = dates.clone();
    sorted.sort();
    assert_eq!(dates, sorted, "rows ordered by date");

    // Every row embeds the student and their account.
    assert!(rows[0]["student"]["user"]["name"].is_string());
    assert!(rows[0]["student"]["admission_no"].is_string());
}

#[tokio::test]
async fn section_averages_match_the_seeded_pattern() {
    let (server, _ws) = test_server();
    let token = login(&server, "admin@example.com").await;
    let (from, to) = seeded_range();

    let res = server
        .get("/api/admin/attendance-section-averages")
        .authorization_bearer(&token)
        .add_query_param("from", &from)
        .add_query_param("to", &to)
        .await;
    res.assert_status_ok();
    let averages: Value = res.json();
    let averages = averages.as_array().expect("averages array");
    // Only the section with seeded students appears.
    assert_eq!(averages.len(), 1);
    assert!(averages[0]["section_name"].is_string());
    // Seeded week: student one is absent once, student two never: 13/14.
    let average = averages[0]["average"].as_f64().expect("average");
    assert!(
        (average - 92.86).abs() < 0.001,
        "expected 92.86, got {}",
        average
    );
}

#[tokio::test]
async fn trends_count_statuses_per_date() {
    let (server, _ws) = test_server();
    let token = login(&server, "admin@example.com").await;
    let section_id = seeded_section_id(&server, &token).await;
    let (from, to) = seeded_range();

    let res = server
        .get("/api/admin/attendance-trends")
        .authorization_bearer(&token)
        .add_query_param("section_id", &section_id)
        .add_query_param("from", &from)
        .add_query_param("to", &to)
        .await;
    res.assert_status_ok();
    let trends: Value = res.json();
    let trends = trends.as_array().expect("trends array");
    assert_eq!(trends.len(), 7, "one row per seeded day");

    // Today: student one absent, student two present.
    let today = trends.last().expect("today's row");
    assert_eq!(today["date"], json!(to));
    assert_eq!(today["present"], 1);
    assert_eq!(today["absent"], 1);
    assert_eq!(today["late"], 0);
}

#[tokio::test]
async fn reports_are_admin_or_teacher_only() {
    let (server, _ws) = test_server();
    let token = login(&server, "student1@example.com").await;
    let (from, to) = seeded_range();

    for path in [
        "/api/admin/attendance-report",
        "/api/admin/attendance-section-averages",
        "/api/admin/attendance-trends",
    ] {
        let res = server
            .get(path)
            .authorization_bearer(&token)
            .add_query_param("from", &from)
            .add_query_param("to", &to)
            .await;
        res.assert_status_forbidden();
    }
}

#[tokio::test]
async fn missing_or_bad_params_are_validation_errors() {
    let (server, _ws) = test_server();
    let token = login(&server, "admin@example.com").await;

    let res = server
        .get("/api/admin/attendance-report")
        .authorization_bearer(&token)
        .await;
    res.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json();
    assert!(body["errors"]["section_id"].is_array());
    assert!(body["errors"]["from"].is_array());
    assert!(body["errors"]["to"].is_array());

    let res = server
        .get("/api/admin/attendance-trends")
        .authorization_bearer(&token)
        .add_query_param("section_id", "no-such-section")
        .add_query_param("from", "not-a-date")
        .add_query_param("to", "2026-01-01")
        .await;
    res.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json();
    assert!(body["errors"]["section_id"].is_array());
    assert!(body["errors"]["from"].is_array());
}
