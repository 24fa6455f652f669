//! HTTP adapters for the external generation services.
//!
//! - [`GeminiClient`]: structured text (proposals, phrases, image prompts)
//!   through the Generative Language `generateContent` REST endpoint.
//! - [`SdWebUiClient`]: image synthesis through the Stable Diffusion WebUI
//!   `txt2img` / `img2img` endpoints.
//!
//! Both implement the collaborator traits from `stampline_core::generation`.

pub mod gemini;
pub mod prompts;
pub mod sd_webui;
pub mod structured;

pub use gemini::{GeminiClient, GeminiConfig};
pub use sd_webui::{SdWebUiClient, SdWebUiConfig};

use stampline_core::generation::ClientError;

/// Map a transport error, distinguishing timeouts.
pub(crate) fn request_error(e: reqwest::Error, timeout_secs: u64) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout(timeout_secs)
    } else {
        ClientError::Request(e.to_string())
    }
}

/// Turn a non-2xx response into [`ClientError::Api`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
