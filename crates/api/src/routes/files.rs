//! Route definitions for the `/files` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::files;
use crate::state::AppState;

/// Routes mounted at `/files`.
///
/// ```text
/// GET    /{set_id}/{filename}    -> download
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{set_id}/{filename}", get(files::download))
}
