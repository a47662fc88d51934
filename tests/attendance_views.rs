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

async fn login(server: &TestServer, email: &str) -> String {
    let res = server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": "password" }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    body["token"].as_str().expect("token").to_string()
}

async fn first_section_id(server: &TestServer, token: &str) -> String {
    let res = server.get("/api/sections").authorization_bearer(token).await;
    res.assert_status_ok();
    let sections: Value = res.json();
    let sections = sections.as_array().expect("sections array");
    sections
        .iter()
        .find(|s| s["teacher"]["email"] == "teacher1@example.com")
        .expect("seeded teacher section")["id"]
        .as_str()
        .expect("id")
        .to_string()
}

#[tokio::test]
async fn section_roster_lists_students_with_their_accounts() {
    let (server, _ws) = test_server();
    let token = login(&server, "teacher1@example.com").await;
    let section_id = first_section_id(&server, &token).await;

    let res = server
        .get(&format!("/api/sections/{}/attendance", section_id))
        .authorization_bearer(&token)
        .await;
    res.assert_status_ok();
    let roster: Value = res.json();
    let roster = roster.as_array().expect("roster array");
    assert_eq!(roster.len(), 2);
    let names: Vec<&str> = roster
        .iter()
        .map(|s| s["user"]["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, ["Student One", "Student Two"]);
    assert_eq!(roster[0]["admission_no"], "ADM001");
}

#[tokio::test]
async fn roster_for_unknown_section_is_not_found() {
    let (server, _ws) = test_server();
    let token = login(&server, "admin@example.com").await;
    let res = server
        .get("/api/sections/no-such-section/attendance")
        .authorization_bearer(&token)
        .await;
    res.assert_status_not_found();
}

#[tokio::test]
async fn roster_is_forbidden_for_students() {
    let (server, _ws) = test_server();
    let admin = login(&server, "admin@example.com").await;
    let section_id = first_section_id(&server, &admin).await;

    let token = login(&server, "student1@example.com").await;
    let res = server
        .get(&format!("/api/sections/{}/attendance", section_id))
        .authorization_bearer(&token)
        .await;
    res.assert_status_forbidden();
}

#[tokio::test]
async fn student_sees_own_attendance_newest_first() {
    let (server, _ws) = test_server();
    let token = login(&server, "student1@example.com").await;
    let res = server
        .get("/api/me/attendance")
        .authorization_bearer(&token)
        .await;
    res.assert_status_ok();
    let records: Value = res.json();
    let records = records.as_array().expect("records array");
    assert_eq!(records.len(), 7, "seeded week of attendance");

    let dates: Vec<&str> = records
        .iter()
        .map(|r| r["date"].as_str().expect("date"))
        .collect();
    let mut sorted = dates.clone();
    sorted.sort();
    sorted.reverse();
    assert_eq!(dates, sorted, "records are newest first");
}

#[tokio::test]
async fn user_without_student_profile_gets_empty_list() {
    let (server, _ws) = test_server();
    let token = login(&server, "admin@example.com").await;
    let res = server
        .get("/api/me/attendance")
        .authorization_bearer(&token)
        .await;
    res.assert_status_ok();
    let records: Value = res.json();
    assert_eq!(records, json!([]));
}

#[tokio::test]
async fn parent_sees_linked_children_with_records() {
    let (server, _ws) = test_server();
    let token = login(&server, "parent1@example.com").await;
    let res = server
        .get("/api/parent/children/attendance")
        .authorization_bearer(&token)
        .await;
    res.assert_status_ok();
    let children: Value = res.json();
    let children = children.as_array().expect("children array");
    assert_eq!(children.len(), 1, "one linked child seeded");
    assert_eq!(children[0]["user"]["name"], "Student One");
    let attendance = children[0]["attendance"].as_array().expect("attendance");
    assert_eq!(attendance.len(), 7);
}

#[tokio::test]
async fn non_guardian_has_no_children_rows() {
    let (server, _ws) = test_server();
    let token = login(&server, "teacher1@example.com").await;
    let res = server
        .get("/api/parent/children/attendance")
        .authorization_bearer(&token)
        .await;
    res.assert_status_ok();
    let children: Value = res.json();
    assert_eq!(children, json!([]));
}
