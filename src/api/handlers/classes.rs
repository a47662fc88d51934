use crate::api::error::ApiError;
use crate::api::extract::AuthUser;
use crate::api::AppState;
use crate::authz;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;

/// All classes with their sections embedded.
pub async fn index(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    if !authz::can_view_roster(user.role) {
        return Err(ApiError::forbidden());
    }

    let conn = state.db.lock().await;

    let mut by_class: HashMap<String, Vec<Value>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT id, name, class_id, teacher_id, created_at, updated_at
         FROM sections
         ORDER BY name",
    )?;
    let sections = stmt
        .query_map([], |r| {
            let class_id: String = r.get(2)?;
            Ok((
                class_id.clone(),
                json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "class_id": class_id,
                    "teacher_id": r.get::<_, Option<String>>(3)?,
                    "created_at": r.get::<_, Option<String>>(4)?,
                    "updated_at": r.get::<_, Option<String>>(5)?,
                }),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (class_id, section) in sections {
        by_class.entry(class_id).or_default().push(section);
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, level, created_at, updated_at FROM classes ORDER BY name",
    )?;
    let classes = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            Ok(json!({
                "id": id.clone(),
                "name": r.get::<_, String>(1)?,
                "level": r.get::<_, String>(2)?,
                "created_at": r.get::<_, Option<String>>(3)?,
                "updated_at": r.get::<_, Option<String>>(4)?,
                "sections": by_class.remove(&id).unwrap_or_default(),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Value::Array(classes)))
}
