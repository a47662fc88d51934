use crate::api::error::ApiError;
use crate::api::AppState;
use crate::auth::{self, Role};
use crate::db;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use rusqlite::OptionalExtension;

/// The authenticated caller, resolved from the bearer token. Rejects with
/// 401 on any failure so handlers only ever see a valid session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role_id: Option<String>,
    pub role: Option<Role>,
    pub token_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(ApiError::unauthenticated)?;
        let bearer = header
            .strip_prefix("Bearer ")
            .ok_or_else(ApiError::unauthenticated)?;
        // Tokens are "<token id>|<secret>"; only the secret digest is stored.
        let (token_id, secret) = bearer
            .split_once('|')
            .ok_or_else(ApiError::unauthenticated)?;

        let conn = state.db.lock().await;
        let row: Option<(String, String, String, String, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT t.token_hash, u.id, u.name, u.email, u.role_id, r.name
                 FROM api_tokens t
                 JOIN users u ON u.id = t.user_id
                 LEFT JOIN roles r ON r.id = u.role_id
                 WHERE t.id = ?",
                [token_id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((token_hash, user_id, name, email, role_id, role_name)) = row else {
            return Err(ApiError::unauthenticated());
        };
        if !auth::digests_match(&token_hash, &auth::digest_hex(secret)) {
            return Err(ApiError::unauthenticated());
        }

        conn.execute(
            "UPDATE api_tokens SET last_used_at = ? WHERE id = ?",
            (db::now_timestamp(), token_id),
        )?;

        Ok(AuthUser {
            id: user_id,
            name,
            email,
            role_id,
            role: role_name.as_deref().and_then(Role::from_name),
            token_id: token_id.to_string(),
        })
    }
}
