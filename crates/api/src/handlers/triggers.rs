//! Handlers for the chat trigger surface.
//!
//! Commands and button actions arrive as JSON, run one engine operation,
//! and answer with the acknowledgement that was also posted to the chat
//! channel.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use stampline_core::notify::Notification;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /commands`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
}

/// Body of `POST /actions`.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action_id: String,
    /// `entityId:parameter`.
    #[serde(default)]
    pub value: String,
}

/// POST /api/v1/commands
pub async fn post_command(
    State(state): State<AppState>,
    Json(input): Json<CommandRequest>,
) -> AppResult<Json<DataResponse<Notification>>> {
    let ack = state.engine.handle_command(&input.text).await?;
    Ok(Json(DataResponse { data: ack }))
}

/// POST /api/v1/actions
pub async fn post_action(
    State(state): State<AppState>,
    Json(input): Json<ActionRequest>,
) -> AppResult<Json<DataResponse<Notification>>> {
    let ack = state
        .engine
        .handle_action(&input.action_id, &input.value)
        .await?;
    Ok(Json(DataResponse { data: ack }))
}
