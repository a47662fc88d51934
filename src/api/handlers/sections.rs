use crate::api::error::ApiError;
use crate::api::extract::AuthUser;
use crate::api::AppState;
use crate::authz;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// All sections with their class and (possibly null) teacher embedded.
pub async fn index(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    if !authz::can_view_roster(user.role) {
        return Err(ApiError::forbidden());
    }

    let conn = state.db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.class_id, s.teacher_id, s.created_at, s.updated_at,
                c.name, c.level,
                u.name, u.email
         FROM sections s
         JOIN classes c ON c.id = s.class_id
         LEFT JOIN users u ON u.id = s.teacher_id
         ORDER BY c.name, s.name",
    )?;
    let sections = stmt
        .query_map([], |r| {
            let class_id: String = r.get(2)?;
            let teacher_id: Option<String> = r.get(3)?;
            let teacher = match teacher_id.as_deref() {
                Some(id) => json!({
                    "id": id,
                    "name": r.get::<_, String>(8)?,
                    "email": r.get::<_, String>(9)?,
                }),
                None => Value::Null,
            };
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "class_id": class_id.clone(),
                "teacher_id": teacher_id,
                "created_at": r.get::<_, Option<String>>(4)?,
                "updated_at": r.get::<_, Option<String>>(5)?,
                "class": json!({
                    "id": class_id,
                    "name": r.get::<_, String>(6)?,
                    "level": r.get::<_, String>(7)?,
                }),
                "teacher": teacher,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Value::Array(sections)))
}
