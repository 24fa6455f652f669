//! Fire-and-forget notification dispatch.

use std::sync::Arc;

use stampline_core::notify::{Notification, NotificationSink};
use tokio::task::JoinHandle;

/// Wraps the injected sink so that stage code never waits on delivery.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Deliver on a separate task. A failed delivery is logged and dropped.
    pub fn send(&self, notification: Notification) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&notification).await {
                tracing::warn!(error = %e, text = %notification.text, "Notification delivery failed");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use stampline_core::notify::NotifyError;
    use tokio::sync::Notify;

    use super::*;

    struct FailingSink;

    #[async_trait::async_trait]
    impl NotificationSink for FailingSink {
        async fn deliver(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("down".into()))
        }
    }

    /// Blocks until released, recording what it was given.
    struct SlowSink {
        release: Notify,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl NotificationSink for SlowSink {
        async fn deliver(&self, n: &Notification) -> Result<(), NotifyError> {
            self.release.notified().await;
            self.seen.lock().unwrap().push(n.text.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let notifier = Notifier::new(Arc::new(FailingSink));
        notifier.send(Notification::text("hello")).await.unwrap();
    }

    #[tokio::test]
    async fn send_does_not_wait_for_delivery() {
        let sink = Arc::new(SlowSink {
            release: Notify::new(),
            seen: Mutex::new(Vec::new()),
        });
        let notifier = Notifier::new(sink.clone());

        let pending = notifier.send(Notification::text("progress"));
        // The caller got control back while the sink is still blocked.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.seen.lock().unwrap().is_empty());

        sink.release.notify_one();
        pending.await.unwrap();
        assert_eq!(*sink.seen.lock().unwrap(), vec!["progress".to_string()]);
    }
}
