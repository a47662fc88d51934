use crate::api::error::{ApiError, Validator};
use crate::api::extract::AuthUser;
use crate::api::AppState;
use crate::authz;
use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub section_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn validate_range(
    v: &mut Validator,
    params: &ReportParams,
) -> (Option<String>, Option<String>) {
    let from = v.require("from", params.from.as_deref());
    let to = v.require("to", params.to.as_deref());
    for (field, value) in [("from", &from), ("to", &to)] {
        if let Some(value) = value.as_deref() {
            if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
                v.add(field, format!("The {} field must be a valid date.", field));
            }
        }
    }
    (from, to)
}

fn validate_section(
    v: &mut Validator,
    conn: &Connection,
    section_id: Option<&str>,
) -> Result<Option<String>, ApiError> {
    let Some(id) = section_id.filter(|s| !s.trim().is_empty()) else {
        v.add("section_id", "The section_id field is required.");
        return Ok(None);
    };
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sections WHERE id = ?",
        [id],
        |r| r.get(0),
    )?;
    if exists == 0 {
        v.add("section_id", "The selected section_id is invalid.");
        return Ok(None);
    }
    Ok(Some(id.to_string()))
}

/// Raw attendance rows for one section over an inclusive date range, each
/// with the student and their user account embedded.
pub async fn attendance_report(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ReportParams>,
) -> Result<Json<Value>, ApiError> {
    if !authz::can_view_reports(user.role) {
        return Err(ApiError::forbidden());
    }

    let conn = state.db.lock().await;
    let mut v = Validator::default();
    let (from, to) = validate_range(&mut v, &params);
    let section_id = validate_section(&mut v, &conn, params.section_id.as_deref())?;
    v.finish()?;
    let (section_id, from, to) = (
        section_id.unwrap_or_default(),
        from.unwrap_or_default(),
        to.unwrap_or_default(),
    );

    let mut stmt = conn.prepare(
        "SELECT a.id, a.student_id, a.teacher_id, a.section_id, a.date, a.status,
                a.created_at, a.updated_at,
                st.user_id, st.admission_no, st.dob,
                u.name, u.email
         FROM attendance a
         JOIN students st ON st.id = a.student_id
         JOIN users u ON u.id = st.user_id
         WHERE a.section_id = ? AND a.date BETWEEN ? AND ?
         ORDER BY a.date",
    )?;
    let records = stmt
        .query_map((&section_id, &from, &to), |r| {
            let student_id: String = r.get(1)?;
            let user_id: String = r.get(8)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "student_id": student_id.clone(),
                "teacher_id": r.get::<_, String>(2)?,
                "section_id": r.get::<_, String>(3)?,
                "date": r.get::<_, String>(4)?,
                "status": r.get::<_, String>(5)?,
                "created_at": r.get::<_, Option<String>>(6)?,
                "updated_at": r.get::<_, Option<String>>(7)?,
                "student": json!({
                    "id": student_id,
                    "user_id": user_id.clone(),
                    "admission_no": r.get::<_, String>(9)?,
                    "dob": r.get::<_, Option<String>>(10)?,
                    "user": json!({
                        "id": user_id,
                        "name": r.get::<_, String>(11)?,
                        "email": r.get::<_, String>(12)?,
                    }),
                }),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Value::Array(records)))
}

/// Percentage of present rows per section over the range. Sections with no
/// rows in range do not appear.
pub async fn section_averages(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ReportParams>,
) -> Result<Json<Value>, ApiError> {
    if !authz::can_view_reports(user.role) {
        return Err(ApiError::forbidden());
    }

    let conn = state.db.lock().await;
    let mut v = Validator::default();
    let (from, to) = validate_range(&mut v, &params);
    v.finish()?;
    let (from, to) = (from.unwrap_or_default(), to.unwrap_or_default());

    let mut stmt = conn.prepare(
        "SELECT s.id, s.name,
                ROUND(100.0 * SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END) / COUNT(*), 2)
         FROM attendance a
         JOIN sections s ON s.id = a.section_id
         WHERE a.date BETWEEN ? AND ?
         GROUP BY s.id, s.name
         ORDER BY s.name",
    )?;
    let averages = stmt
        .query_map((&from, &to), |r| {
            Ok(json!({
                "section": r.get::<_, String>(0)?,
                "section_name": r.get::<_, String>(1)?,
                "average": r.get::<_, f64>(2)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Value::Array(averages)))
}

/// Per-date present/absent/late counts for one section over the range.
pub async fn trends(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ReportParams>,
) -> Result<Json<Value>, ApiError> {
    if !authz::can_view_reports(user.role) {
        return Err(ApiError::forbidden());
    }

    let conn = state.db.lock().await;
    let mut v = Validator::default();
    let (from, to) = validate_range(&mut v, &params);
    let section_id = validate_section(&mut v, &conn, params.section_id.as_deref())?;
    v.finish()?;
    let (section_id, from, to) = (
        section_id.unwrap_or_default(),
        from.unwrap_or_default(),
        to.unwrap_or_default(),
    );

    let mut stmt = conn.prepare(
        "SELECT date,
                SUM(CASE WHEN status = 'present' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'absent' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'late' THEN 1 ELSE 0 END)
         FROM attendance
         WHERE section_id = ? AND date BETWEEN ? AND ?
         GROUP BY date
         ORDER BY date",
    )?;
    let rows = stmt
        .query_map((&section_id, &from, &to), |r| {
            Ok(json!({
                "date": r.get::<_, String>(0)?,
                "present": r.get::<_, i64>(1)?,
                "absent": r.get::<_, i64>(2)?,
                "late": r.get::<_, i64>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Value::Array(rows)))
}
