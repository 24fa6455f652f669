//! Log-only notification sink, used when no chat transport is configured.

use stampline_core::notify::{Notification, NotificationSink, NotifyError};

/// Writes every notification to the tracing log and never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationSink for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            text = %notification.text,
            interactive = notification.blocks.is_some(),
            "Notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        let sink = LogNotifier;
        sink.deliver(&Notification::text("hello")).await.unwrap();
    }
}
