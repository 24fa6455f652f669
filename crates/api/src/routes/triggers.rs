//! Route definitions for the chat trigger surface.

use axum::routing::post;
use axum::Router;

use crate::handlers::triggers;
use crate::state::AppState;

/// Trigger routes, merged at the `/api/v1` root.
///
/// ```text
/// POST   /commands    -> post_command   {"text": "new|list|help"}
/// POST   /actions     -> post_action    {"action_id", "value"}
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/commands", post(triggers::post_command))
        .route("/actions", post(triggers::post_action))
}
