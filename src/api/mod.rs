pub mod error;
pub mod extract;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> AppState {
        AppState {
            db: Arc::new(Mutex::new(conn)),
        }
    }
}

/// Route table mirrors the SPA contract. Everything except login requires a
/// bearer token; role gates live in the handlers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/users/me", get(handlers::auth::me))
        .route("/api/attendance", post(handlers::attendance::record))
        .route(
            "/api/sections/{id}/attendance",
            get(handlers::attendance::section_roster),
        )
        .route(
            "/api/admin/attendance-report",
            get(handlers::reports::attendance_report),
        )
        .route(
            "/api/admin/attendance-section-averages",
            get(handlers::reports::section_averages),
        )
        .route(
            "/api/admin/attendance-trends",
            get(handlers::reports::trends),
        )
        .route("/api/me/attendance", get(handlers::attendance::my_attendance))
        .route(
            "/api/parent/children/attendance",
            get(handlers::attendance::parent_children),
        )
        .route("/api/classes", get(handlers::classes::index))
        .route("/api/sections", get(handlers::sections::index))
        .route("/api/students", get(handlers::students::index))
        // SPA runs on another origin during development.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
