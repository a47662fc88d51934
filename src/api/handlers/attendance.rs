use crate::api::error::{ApiError, Validator};
use crate::api::extract::AuthUser;
use crate::api::AppState;
use crate::authz;
use crate::db;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

const STATUSES: [&str; 4] = ["present", "absent", "late", "excused"];

struct Entry {
    student_id: String,
    status: String,
}

/// Record attendance for a section. Accepts the flat single-record body the
/// original API used, or `{section_id, date, entries: [...]}` to stamp a
/// whole roster at once. Either way every entry is an upsert on
/// (student, section, date) and the batch commits in one transaction.
pub async fn record(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !authz::can_record_attendance(user.role) {
        return Err(ApiError::forbidden());
    }

    let bulk = body.get("entries").is_some();
    let mut v = Validator::default();
    let section_id = v.require("section_id", body.get("section_id").and_then(|x| x.as_str()));
    let date = v.require("date", body.get("date").and_then(|x| x.as_str()));
    if let Some(date) = date.as_deref() {
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            v.add("date", "The date field must be a valid date.");
        }
    }

    let mut entries: Vec<Entry> = Vec::new();
    if bulk {
        match body.get("entries").and_then(|x| x.as_array()) {
            Some(items) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    let student_id = item.get("student_id").and_then(|x| x.as_str());
                    let status = item.get("status").and_then(|x| x.as_str());
                    match (student_id, status) {
                        (Some(student_id), Some(status)) => entries.push(Entry {
                            student_id: student_id.to_string(),
                            status: status.to_string(),
                        }),
                        _ => v.add(
                            "entries",
                            format!("entries.{}: student_id and status are required.", i),
                        ),
                    }
                }
            }
            _ => v.add("entries", "The entries field is required."),
        }
    } else {
        let student_id = v.require("student_id", body.get("student_id").and_then(|x| x.as_str()));
        let status = v.require("status", body.get("status").and_then(|x| x.as_str()));
        if let (Some(student_id), Some(status)) = (student_id, status) {
            entries.push(Entry { student_id, status });
        }
    }

    let conn = state.db.lock().await;

    if let Some(id) = section_id.as_deref() {
        if !row_exists(&conn, "SELECT 1 FROM sections WHERE id = ?", id)? {
            v.add("section_id", "The selected section_id is invalid.");
        }
    }
    v.finish()?;
    let (section_id, date) = (section_id.unwrap_or_default(), date.unwrap_or_default());

    // Ownership is decided before the entries are inspected: a teacher
    // posting to someone else's section gets 403, not a validation error.
    if !authz::can_record_for_section(&conn, user.role, &user.id, &section_id)? {
        return Err(ApiError::forbidden());
    }

    let mut v = Validator::default();
    for entry in &entries {
        if !STATUSES.contains(&entry.status.as_str()) {
            v.add("status", "The selected status is invalid.");
        }
        if !row_exists(&conn, "SELECT 1 FROM students WHERE id = ?", &entry.student_id)? {
            v.add("student_id", "The selected student_id is invalid.");
        } else {
            let member: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM students WHERE id = ? AND section_id = ?",
                    (&entry.student_id, &section_id),
                    |r| r.get(0),
                )
                .optional()?;
            if member.is_none() {
                v.add("student_id", "The student does not belong to the section.");
            }
        }
    }
    v.finish()?;

    let tx = conn.unchecked_transaction()?;
    let mut ids: Vec<String> = Vec::with_capacity(entries.len());
    for entry in &entries {
        let now = db::now_timestamp();
        tx.execute(
            "INSERT INTO attendance(id, student_id, teacher_id, section_id, date, status, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, section_id, date) DO UPDATE SET
               status = excluded.status,
               teacher_id = excluded.teacher_id,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &entry.student_id,
                &user.id,
                &section_id,
                &date,
                &entry.status,
                &now,
                &now,
            ),
        )?;
        let id: String = tx.query_row(
            "SELECT id FROM attendance WHERE student_id = ? AND section_id = ? AND date = ?",
            (&entry.student_id, &section_id, &date),
            |r| r.get(0),
        )?;
        ids.push(id);
    }
    tx.commit()?;

    let mut records = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(record) = fetch_record(&conn, id)? {
            records.push(record);
        }
    }

    if bulk {
        let count = records.len();
        Ok((
            StatusCode::CREATED,
            Json(json!({ "records": records, "count": count })),
        ))
    } else {
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::server_error("stored attendance row vanished"))?;
        Ok((StatusCode::CREATED, Json(record)))
    }
}

/// Roster for taking attendance: the section's students with user accounts.
pub async fn section_roster(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !authz::can_view_roster(user.role) {
        return Err(ApiError::forbidden());
    }

    let conn = state.db.lock().await;
    if !row_exists(&conn, "SELECT 1 FROM sections WHERE id = ?", &id)? {
        return Err(ApiError::not_found("Section not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT st.id, st.user_id, st.admission_no, st.dob, st.section_id,
                u.name, u.email
         FROM students st
         JOIN users u ON u.id = st.user_id
         WHERE st.section_id = ?
         ORDER BY u.name",
    )?;
    let students = stmt
        .query_map([&id], |r| {
            let user_id: String = r.get(1)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "user_id": user_id.clone(),
                "admission_no": r.get::<_, String>(2)?,
                "dob": r.get::<_, Option<String>>(3)?,
                "section_id": r.get::<_, String>(4)?,
                "user": json!({
                    "id": user_id,
                    "name": r.get::<_, String>(5)?,
                    "email": r.get::<_, String>(6)?,
                }),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Value::Array(students)))
}

/// The calling user's own records, newest first. Users without a student
/// profile get an empty list, not an error.
pub async fn my_attendance(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let conn = state.db.lock().await;
    let student_id: Option<String> = conn
        .query_row("SELECT id FROM students WHERE user_id = ?", [&user.id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(student_id) = student_id else {
        return Ok(Json(json!([])));
    };

    let records = fetch_student_records(&conn, &student_id)?;
    Ok(Json(Value::Array(records)))
}

/// Children linked to the calling guardian, each with their records newest
/// first. Non-guardians simply have no rows.
pub async fn parent_children(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let conn = state.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT st.id, st.user_id, st.admission_no, st.dob, st.section_id,
                u.name, u.email
         FROM guardian_students gs
         JOIN students st ON st.id = gs.student_id
         JOIN users u ON u.id = st.user_id
         WHERE gs.guardian_id = ?
         ORDER BY u.name",
    )?;
    let children = stmt
        .query_map([&user.id], |r| {
            let user_id: String = r.get(1)?;
            Ok((
                r.get::<_, String>(0)?,
                json!({
                    "user_id": user_id.clone(),
                    "admission_no": r.get::<_, String>(2)?,
                    "dob": r.get::<_, Option<String>>(3)?,
                    "section_id": r.get::<_, String>(4)?,
                    "user": json!({
                        "id": user_id,
                        "name": r.get::<_, String>(5)?,
                        "email": r.get::<_, String>(6)?,
                    }),
                }),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(children.len());
    for (student_id, mut child) in children {
        let records = fetch_student_records(&conn, &student_id)?;
        child["id"] = json!(student_id);
        child["attendance"] = Value::Array(records);
        out.push(child);
    }
    Ok(Json(Value::Array(out)))
}

fn row_exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, rusqlite::Error> {
    let hit: Option<i64> = conn.query_row(sql, [id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

fn fetch_record(conn: &Connection, id: &str) -> Result<Option<Value>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, student_id, teacher_id, section_id, date, status, created_at, updated_at
         FROM attendance WHERE id = ?",
        [id],
        record_from_row,
    )
    .optional()
}

fn fetch_student_records(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<Value>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, teacher_id, section_id, date, status, created_at, updated_at
         FROM attendance
         WHERE student_id = ?
         ORDER BY date DESC",
    )?;
    let records = stmt
        .query_map([student_id], record_from_row)?
        .collect::<Result<Vec<_>, _>>();
    records
}

fn record_from_row(r: &rusqlite::Row<'_>) -> Result<Value, rusqlite::Error> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "student_id": r.get::<_, String>(1)?,
        "teacher_id": r.get::<_, String>(2)?,
        "section_id": r.get::<_, String>(3)?,
        "date": r.get::<_, String>(4)?,
        "status": r.get::<_, String>(5)?,
        "created_at": r.get::<_, Option<String>>(6)?,
        "updated_at": r.get::<_, Option<String>>(7)?,
    }))
}
