//! Route definitions for the `/sets` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::sets;
use crate::state::AppState;

/// Largest accepted reference upload.
const MAX_REFERENCE_BYTES: usize = 20 * 1024 * 1024;

/// Routes mounted at `/sets`.
///
/// ```text
/// GET    /                  -> list_sets   (?status=&genre=&limit=)
/// GET    /{id}              -> get_set
/// POST   /{id}/export       -> export_set
/// POST   /{id}/reference    -> upload_reference (raw image bytes)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(sets::list_sets))
        .route("/{id}", get(sets::get_set))
        .route("/{id}/export", post(sets::export_set))
        .route(
            "/{id}/reference",
            post(sets::upload_reference).layer(DefaultBodyLimit::max(MAX_REFERENCE_BYTES)),
        )
}
