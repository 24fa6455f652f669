//! Platform event log model.

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use stampline_core::types::{DbId, Timestamp};

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: DbId,
    /// Dot-separated name, e.g. `stage.failed`.
    pub event_type: String,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    pub payload: Json<serde_json::Value>,
    pub created_at: Timestamp,
}
