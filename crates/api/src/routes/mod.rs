pub mod files;
pub mod health;
pub mod sets;
pub mod triggers;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /health                                 service and database health
///
/// /sets                                   list (?status=&genre=&limit=)
/// /sets/{id}                              detail with stamps and artifacts
/// /sets/{id}/export                       training-data export (POST)
/// /sets/{id}/reference                    reference image upload (POST, raw bytes)
///
/// /files/{set_id}/{filename}              artifact download
///
/// /commands                               text command (POST)
/// /actions                                button action (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/sets", sets::router())
        .nest("/files", files::router())
        .merge(triggers::router())
}
