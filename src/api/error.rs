use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::BTreeMap;

/// Error surface for every handler. Maps to the wire format the SPA expects:
/// a JSON body with `message`, plus `errors` for validation failures.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    pub fn unauthenticated() -> ApiError {
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            body: json!({ "message": "Unauthenticated." }),
        }
    }

    pub fn forbidden() -> ApiError {
        ApiError {
            status: StatusCode::FORBIDDEN,
            body: json!({ "message": "Forbidden. Insufficient role." }),
        }
    }

    pub fn invalid_login() -> ApiError {
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            body: json!({ "message": "Invalid login details" }),
        }
    }

    pub fn not_found(message: impl Into<String>) -> ApiError {
        ApiError {
            status: StatusCode::NOT_FOUND,
            body: json!({ "message": message.into() }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "message": message.into() }),
        }
    }

    /// 422 with per-field messages, in the shape validation errors had in the
    /// original API.
    pub fn validation(errors: BTreeMap<&'static str, Vec<String>>) -> ApiError {
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: json!({
                "message": "The given data was invalid.",
                "errors": errors,
            }),
        }
    }

    pub fn server_error(err: impl std::fmt::Display) -> ApiError {
        tracing::error!(error = %err, "request failed");
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "message": "Server error" }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> ApiError {
        ApiError::server_error(err)
    }
}

/// Accumulates field errors; `finish` yields `Err` once anything was added.
#[derive(Default)]
pub struct Validator {
    errors: BTreeMap<&'static str, Vec<String>>,
}

impl Validator {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    pub fn require(&mut self, field: &'static str, value: Option<&str>) -> Option<String> {
        match value {
            Some(v) if !v.trim().is_empty() => Some(v.to_string()),
            _ => {
                self.add(field, format!("The {} field is required.", field));
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(self.errors))
        }
    }
}
