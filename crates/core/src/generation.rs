//! Contracts for the external generation services.
//!
//! [`PromptClient`] produces structured text (character proposals, stamp
//! phrases, image prompts); [`ImageClient`] renders one image per call.
//! Adapters live in `stampline-clients`; the workflow engine only sees
//! these traits.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::genre::Genre;

/// Default bounded wait for one image-generation call.
pub const IMAGE_TIMEOUT_SECS: u64 = 300;

/// Negative prompt applied when a stamp has none of its own.
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "lowres, bad anatomy, bad hands, text, error, missing fingers, cropped, worst quality, \
     low quality, jpeg artifacts, signature, watermark, blurry";

/// One candidate character direction returned by the prompt service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProposal {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub description: String,
    /// Style/appearance prompt fragment shared by every stamp.
    #[serde(default, alias = "sd_base_prompt")]
    pub base_prompt: String,
    /// Whether the service recommends keeping the character consistent.
    #[serde(default = "default_true", alias = "character_consistency")]
    pub consistency_hint: bool,
}

fn default_true() -> bool {
    true
}

/// Input for authoring one stamp's image prompt.
#[derive(Debug, Clone)]
pub struct ImagePromptRequest<'a> {
    pub phrase: &'a str,
    pub character_description: &'a str,
    pub base_prompt: &'a str,
    /// Free-text change requested by a reviewer.
    pub modification: Option<&'a str>,
}

/// Input for one image-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    /// Reference image for image-to-image generation.
    pub reference: Option<PathBuf>,
}

/// Errors from a generation service call.
///
/// Every variant is scoped to the single call that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network, DNS or TLS failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// No answer within the bounded wait.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The service returned a non-2xx status.
    #[error("Service error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The service answered with nothing usable.
    #[error("Empty response: {0}")]
    Empty(String),

    /// The reference image could not be read.
    #[error("Reference image unusable: {0}")]
    Reference(String),
}

/// Structured-text generation.
///
/// Output that cannot be parsed as the expected structure is returned as
/// an empty result rather than an error.
#[async_trait::async_trait]
pub trait PromptClient: Send + Sync {
    /// Propose character directions for a genre.
    async fn proposals(
        &self,
        genre: Genre,
        hint: Option<&str>,
    ) -> Result<Vec<CharacterProposal>, ClientError>;

    /// Propose stamp phrases for a character.
    async fn phrases(
        &self,
        character_description: &str,
        hint: Option<&str>,
    ) -> Result<Vec<String>, ClientError>;

    /// Author the image prompt for one stamp.
    async fn image_prompt(&self, request: &ImagePromptRequest<'_>) -> Result<String, ClientError>;
}

/// Image synthesis.
#[async_trait::async_trait]
pub trait ImageClient: Send + Sync {
    /// Render one image, returning encoded image bytes.
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_accepts_service_field_names() {
        let raw = serde_json::json!({
            "name": "Mochi",
            "genre": "animal",
            "description": "A round white cat",
            "sd_base_prompt": "chibi white cat, flat colors",
            "character_consistency": false
        });
        let p: CharacterProposal = serde_json::from_value(raw).unwrap();
        assert_eq!(p.base_prompt, "chibi white cat, flat colors");
        assert!(!p.consistency_hint);
    }

    #[test]
    fn proposal_defaults_missing_fields() {
        let p: CharacterProposal = serde_json::from_str(r#"{"name": "Blob"}"#).unwrap();
        assert_eq!(p.name, "Blob");
        assert!(p.description.is_empty());
        assert!(p.consistency_hint);
    }

    #[test]
    fn timeout_error_mentions_duration() {
        assert_eq!(
            ClientError::Timeout(IMAGE_TIMEOUT_SECS).to_string(),
            "Request timed out after 300s"
        );
    }
}
