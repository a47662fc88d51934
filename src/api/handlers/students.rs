use crate::api::error::ApiError;
use crate::api::extract::AuthUser;
use crate::api::AppState;
use crate::authz;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// All students with their user account and section embedded.
pub async fn index(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    if !authz::can_view_roster(user.role) {
        return Err(ApiError::forbidden());
    }

    let conn = state.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT st.id, st.user_id, st.admission_no, st.dob, st.section_id,
                st.created_at, st.updated_at,
                u.name, u.email,
                sec.name, sec.class_id, sec.teacher_id
         FROM students st
         JOIN users u ON u.id = st.user_id
         JOIN sections sec ON sec.id = st.section_id
         ORDER BY u.name",
    )?;
    let students = stmt
        .query_map([], |r| {
            let user_id: String = r.get(1)?;
            let section_id: String = r.get(4)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "user_id": user_id.clone(),
                "admission_no": r.get::<_, String>(2)?,
                "dob": r.get::<_, Option<String>>(3)?,
                "section_id": section_id.clone(),
                "created_at": r.get::<_, Option<String>>(5)?,
                "updated_at": r.get::<_, Option<String>>(6)?,
                "user": json!({
                    "id": user_id,
                    "name": r.get::<_, String>(7)?,
                    "email": r.get::<_, String>(8)?,
                }),
                "section": json!({
                    "id": section_id,
                    "name": r.get::<_, String>(9)?,
                    "class_id": r.get::<_, String>(10)?,
                    "teacher_id": r.get::<_, Option<String>>(11)?,
                }),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Value::Array(students)))
}
