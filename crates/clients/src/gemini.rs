//! Prompt client over the Generative Language REST API.
//!
//! One `POST {api_base}/models/{model}:generateContent` per call; the
//! first candidate's text parts are concatenated and handed to the
//! tolerant parsers in [`crate::structured`].

use std::time::Duration;

use serde::Deserialize;
use stampline_core::generation::{CharacterProposal, ClientError, ImagePromptRequest, PromptClient};
use stampline_core::genre::Genre;

use crate::{ensure_success, prompts, request_error, structured};

/// Default REST root.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model name.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Default number of phrases requested per set.
pub const DEFAULT_PHRASE_COUNT: usize = 30;

/// Text generation is quick; keep the wait short.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub phrase_count: usize,
}

impl GeminiConfig {
    /// Read `GEMINI_API_KEY`, `GEMINI_MODEL` and `PHRASE_COUNT`.
    ///
    /// Returns `None` when no API key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty())?;
        Some(Self {
            api_key,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_base: DEFAULT_API_BASE.to_string(),
            phrase_count: std::env::var("PHRASE_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PHRASE_COUNT),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// HTTP client for the language model.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Send one prompt and return the generated text.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, ClientError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(e, REQUEST_TIMEOUT_SECS))?;
        let response = ensure_success(response).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        parsed
            .text()
            .ok_or_else(|| ClientError::Empty("no candidate text".to_string()))
    }
}

#[async_trait::async_trait]
impl PromptClient for GeminiClient {
    async fn proposals(
        &self,
        genre: Genre,
        hint: Option<&str>,
    ) -> Result<Vec<CharacterProposal>, ClientError> {
        let text = self.generate_text(&prompts::proposals(genre, hint)).await?;
        Ok(structured::parse_proposals(&text))
    }

    async fn phrases(
        &self,
        character_description: &str,
        hint: Option<&str>,
    ) -> Result<Vec<String>, ClientError> {
        let prompt = prompts::phrases(character_description, self.config.phrase_count, hint);
        let text = self.generate_text(&prompt).await?;
        Ok(structured::parse_phrases(&text))
    }

    async fn image_prompt(&self, request: &ImagePromptRequest<'_>) -> Result<String, ClientError> {
        let text = self.generate_text(&prompts::image_prompt(request)).await?;
        Ok(structured::strip_fences(&text).to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
