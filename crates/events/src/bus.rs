//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`. The workflow engine publishes
//! status changes and stage failures here; [`EventPersistence`] writes them
//! to the database.
//!
//! [`EventPersistence`]: crate::persistence::EventPersistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stampline_core::types::DbId;
use tokio::sync::broadcast;

/// A stamp set changed status.
pub const EVENT_STATUS_CHANGED: &str = "stamp_set.status_changed";

/// A background stage failed.
pub const EVENT_STAGE_FAILED: &str = "stage.failed";

/// A single stamp failed to generate; the batch continued.
pub const EVENT_STAMP_FAILED: &str = "stamp.generation_failed";

/// Training data was exported.
pub const EVENT_EXPORTED: &str = "stamp_set.exported";

/// A derived model finished training.
pub const EVENT_MODEL_TRAINED: &str = "stamp_set.model_trained";

/// Source entity kind for stamp sets.
pub const ENTITY_STAMP_SET: &str = "stamp_set";

/// Source entity kind for stamps.
pub const ENTITY_STAMP: &str = "stamp";

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A structured record of something that happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"stage.failed"`.
    pub event_type: String,

    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    /// Create an event with only its type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach a source entity to the event.
    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// `stage.failed` for a set.
    pub fn stage_failed(set_id: DbId, stage: &str, kind: &str, message: &str) -> Self {
        Self::new(EVENT_STAGE_FAILED)
            .with_source(ENTITY_STAMP_SET, set_id)
            .with_payload(serde_json::json!({
                "stage": stage,
                "kind": kind,
                "message": message,
            }))
    }

    /// `stamp_set.status_changed` for a set.
    pub fn status_changed(set_id: DbId, from: &str, to: &str) -> Self {
        Self::new(EVENT_STATUS_CHANGED)
            .with_source(ENTITY_STAMP_SET, set_id)
            .with_payload(serde_json::json!({ "from": from, "to": to }))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unread events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
