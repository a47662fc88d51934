use crate::api::error::{ApiError, Validator};
use crate::api::extract::AuthUser;
use crate::api::AppState;
use crate::auth;
use crate::db;
use axum::extract::State;
use axum::Json;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::default();
    let email = v.require("email", body.get("email").and_then(|v| v.as_str()));
    let password = v.require("password", body.get("password").and_then(|v| v.as_str()));
    if let Some(email) = email.as_deref() {
        if !email.contains('@') {
            v.add("email", "The email field must be a valid email address.");
        }
    }
    v.finish()?;
    let (email, password) = (email.unwrap_or_default(), password.unwrap_or_default());

    let conn = state.db.lock().await;
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((user_id, password_hash)) = row else {
        return Err(ApiError::invalid_login());
    };
    if !auth::verify_password(&password, &password_hash) {
        return Err(ApiError::invalid_login());
    }

    let token = issue_token(&conn, &user_id)?;
    let user = fetch_user_with_role(&conn, &user_id)?
        .ok_or_else(|| ApiError::server_error("user row vanished during login"))?;
    Ok(Json(json!({ "token": token, "user": user })))
}

/// Rotate the caller's token: mint a new one, revoke the one that made this
/// request. The SPA calls this from its 401 interceptor.
pub async fn refresh(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let conn = state.db.lock().await;
    let token = issue_token(&conn, &user.id)?;
    conn.execute("DELETE FROM api_tokens WHERE id = ?", [&user.token_id])?;
    let user = fetch_user_with_role(&conn, &user.id)?
        .ok_or_else(|| ApiError::server_error("user row vanished during refresh"))?;
    Ok(Json(json!({ "token": token, "user": user })))
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let conn = state.db.lock().await;
    let user = fetch_user_with_role(&conn, &user.id)?.ok_or_else(ApiError::unauthenticated)?;
    Ok(Json(user))
}

fn issue_token(conn: &Connection, user_id: &str) -> Result<String, ApiError> {
    let token = auth::mint_token();
    conn.execute(
        "INSERT INTO api_tokens(id, user_id, token_hash, created_at) VALUES(?, ?, ?, ?)",
        (&token.id, user_id, &token.token_hash, db::now_timestamp()),
    )?;
    Ok(token.plaintext)
}

/// User JSON with the embedded role, password hash excluded.
pub fn fetch_user_with_role(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<Value>, rusqlite::Error> {
    conn.query_row(
        "SELECT u.id, u.name, u.email, u.role_id, u.created_at, u.updated_at,
                r.id, r.name, r.permissions
         FROM users u
         LEFT JOIN roles r ON r.id = u.role_id
         WHERE u.id = ?",
        [user_id],
        |r| {
            let role_id: Option<String> = r.get(6)?;
            let role = match role_id {
                Some(id) => {
                    let permissions: String = r.get(8)?;
                    json!({
                        "id": id,
                        "name": r.get::<_, String>(7)?,
                        "permissions": serde_json::from_str::<Value>(&permissions)
                            .unwrap_or(Value::Null),
                    })
                }
                None => Value::Null,
            };
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "role_id": r.get::<_, Option<String>>(3)?,
                "created_at": r.get::<_, Option<String>>(4)?,
                "updated_at": r.get::<_, Option<String>>(5)?,
                "role": role,
            }))
        },
    )
    .optional()
}
