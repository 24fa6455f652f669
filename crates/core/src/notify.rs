//! Notification sink contract.
//!
//! The workflow engine reports progress, results and failures through a
//! single injected [`NotificationSink`]. Delivery is best-effort: the
//! engine dispatches each notification on its own task, logs a failed
//! delivery and moves on.

use serde::Serialize;

/// One outbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Plain-text body, also used as the fallback for clients that cannot
    /// render `blocks`.
    pub text: String,
    /// Optional structured interactive payload (buttons, image previews).
    pub blocks: Option<serde_json::Value>,
}

impl Notification {
    /// A text-only notification.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
        }
    }

    /// Attach an interactive payload.
    pub fn with_blocks(mut self, blocks: serde_json::Value) -> Self {
        self.blocks = Some(blocks);
        self
    }
}

/// Errors from a notification transport.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The transport could not be reached.
    #[error("Notification transport failed: {0}")]
    Transport(String),

    /// The transport answered but refused the message.
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Destination for workflow notifications.
///
/// Implementations must be safe to call from any background task.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}
