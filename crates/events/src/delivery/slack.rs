//! Slack delivery through the Web API `chat.postMessage` method.
//!
//! Transport failures are retried with exponential backoff (1 s, 2 s).
//! A response with `"ok": false` is a rejection and is not retried.

use std::time::Duration;

use serde::Deserialize;
use stampline_core::notify::{Notification, NotificationSink, NotifyError};

/// Default Slack Web API root.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Retry delays in seconds after a transport failure.
const RETRY_DELAYS_SECS: [u64; 2] = [1, 2];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials and destination for [`SlackNotifier`].
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub api_base: String,
}

impl SlackConfig {
    /// Read `SLACK_BOT_TOKEN` and `SLACK_CHANNEL_ID`.
    ///
    /// Returns `None` unless both are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("SLACK_BOT_TOKEN").ok().filter(|v| !v.is_empty())?;
        let channel_id = std::env::var("SLACK_CHANNEL_ID").ok().filter(|v| !v.is_empty())?;
        Some(Self {
            bot_token,
            channel_id,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts workflow notifications to one Slack channel.
pub struct SlackNotifier {
    client: reqwest::Client,
    config: SlackConfig,
}

impl SlackNotifier {
    /// Create a notifier with its own HTTP client.
    pub fn new(config: SlackConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn message_body(&self, notification: &Notification) -> serde_json::Value {
        let mut body = serde_json::json!({
            "channel": self.config.channel_id,
            "text": notification.text,
        });
        if let Some(blocks) = &notification.blocks {
            body["blocks"] = blocks.clone();
        }
        body
    }

    async fn try_send(&self, body: &serde_json::Value) -> Result<(), NotifyError> {
        let url = format!("{}/chat.postMessage", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.bot_token)
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Transport(format!("Slack returned HTTP {}", status.as_u16())));
        }

        let parsed: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !parsed.ok {
            return Err(NotifyError::Rejected(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationSink for SlackNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = self.message_body(notification);

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(&body).await {
                Ok(()) => return Ok(()),
                Err(e @ NotifyError::Rejected(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Slack delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        self.try_send(&body).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn serve(reply: serde_json::Value) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/chat.postMessage",
                post(
                    move |State(seen): State<Captured>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| {
                        let reply = reply.clone();
                        async move {
                            let auth = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            seen.lock().unwrap().push((auth, body));
                            Json(reply)
                        }
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    fn notifier(api_base: String) -> SlackNotifier {
        SlackNotifier::new(SlackConfig {
            bot_token: "xoxb-test".into(),
            channel_id: "C123".into(),
            api_base,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_text_and_blocks_with_bearer_token() {
        let (base, captured) = serve(serde_json::json!({"ok": true})).await;
        let sink = notifier(base);

        let n = Notification::text("Samples ready")
            .with_blocks(serde_json::json!([{"type": "section"}]));
        sink.deliver(&n).await.unwrap();

        let seen = captured.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer xoxb-test"));
        assert_eq!(seen[0].1["channel"], "C123");
        assert_eq!(seen[0].1["text"], "Samples ready");
        assert_eq!(seen[0].1["blocks"][0]["type"], "section");
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let (base, captured) =
            serve(serde_json::json!({"ok": false, "error": "channel_not_found"})).await;
        let sink = notifier(base);

        let err = sink.deliver(&Notification::text("hi")).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(ref code) if code == "channel_not_found"));
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[test]
    fn text_only_body_has_no_blocks() {
        let sink = notifier(DEFAULT_API_BASE.into());
        let body = sink.message_body(&Notification::text("plain"));
        assert!(body.get("blocks").is_none());
    }
}
