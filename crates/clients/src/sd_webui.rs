//! Image client for the Stable Diffusion WebUI HTTP API.
//!
//! Requests without a reference go to `/sdapi/v1/txt2img`. With a
//! reference image the picture is resized to the sticker canvas, sent
//! base64-encoded as the init image to `/sdapi/v1/img2img`.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use stampline_core::generation::{ClientError, ImageClient, ImageRequest, IMAGE_TIMEOUT_SECS};

use crate::{ensure_success, request_error};

/// Default WebUI address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:7860";

/// Sticker canvas size.
pub const STAMP_WIDTH: u32 = 370;
pub const STAMP_HEIGHT: u32 = 320;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone)]
pub struct SdWebUiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    /// How far img2img may move away from the reference.
    pub denoising_strength: f32,
}

impl Default for SdWebUiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: IMAGE_TIMEOUT_SECS,
            steps: 30,
            cfg_scale: 7.0,
            sampler_name: "DPM++ 2M Karras".to_string(),
            denoising_strength: 0.6,
        }
    }
}

impl SdWebUiConfig {
    /// Read `SD_WEBUI_URL` and `SD_TIMEOUT_SECS` over the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SD_WEBUI_URL") {
            config.base_url = url;
        }
        if let Some(secs) = std::env::var("SD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_secs = secs;
        }
        config
    }
}

#[derive(Debug, Serialize)]
struct GenerationPayload<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    cfg_scale: f32,
    steps: u32,
    sampler_name: &'a str,
    seed: i64,
    save_images: bool,
    send_images: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denoising_strength: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// HTTP client for one WebUI instance.
pub struct SdWebUiClient {
    client: reqwest::Client,
    config: SdWebUiConfig,
}

impl SdWebUiClient {
    pub fn new(config: SdWebUiConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Whether the WebUI answers at all.
    pub async fn ping(&self) -> bool {
        self.client
            .get(format!("{}/", self.config.base_url.trim_end_matches('/')))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/sdapi/v1/{name}", self.config.base_url.trim_end_matches('/'))
    }
}

/// Load a reference image, fit it to the sticker canvas and base64 it.
pub async fn encode_reference(path: &Path) -> Result<String, ClientError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ClientError::Reference(format!("{}: {e}", path.display())))?;

    // Decoding and resampling are CPU-bound.
    tokio::task::spawn_blocking(move || {
        let img = image::load_from_memory(&bytes)
            .map_err(|e| ClientError::Reference(e.to_string()))?;
        let resized = img.resize_exact(
            STAMP_WIDTH,
            STAMP_HEIGHT,
            image::imageops::FilterType::Lanczos3,
        );
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(resized.to_rgb8())
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| ClientError::Reference(e.to_string()))?;
        Ok(BASE64.encode(out.into_inner()))
    })
    .await
    .map_err(|e| ClientError::Reference(e.to_string()))?
}

#[async_trait::async_trait]
impl ImageClient for SdWebUiClient {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>, ClientError> {
        let init_image = match &request.reference {
            Some(path) => Some(encode_reference(path).await?),
            None => None,
        };
        let endpoint = if init_image.is_some() {
            self.endpoint("img2img")
        } else {
            self.endpoint("txt2img")
        };

        let payload = GenerationPayload {
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            width: STAMP_WIDTH,
            height: STAMP_HEIGHT,
            cfg_scale: self.config.cfg_scale,
            steps: self.config.steps,
            sampler_name: &self.config.sampler_name,
            seed: request.seed,
            save_images: false,
            send_images: true,
            denoising_strength: init_image.as_ref().map(|_| self.config.denoising_strength),
            init_images: init_image.map(|img| vec![img]),
        };

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error(e, self.config.timeout_secs))?;
        let response = ensure_success(response).await?;
        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let first = parsed
            .images
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Empty("no images in response".to_string()))?;
        // Some builds prefix a data URL header.
        let encoded = first.split_once(',').map_or(first.as_str(), |(_, data)| data);
        BASE64
            .decode(encoded)
            .map_err(|e| ClientError::Empty(format!("undecodable image: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    type Seen = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    async fn fake_webui() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let png = BASE64.encode(b"\x89PNG fake");
        let reply = serde_json::json!({ "images": [png] });

        let record = |name: &'static str, reply: serde_json::Value| {
            move |State(seen): State<Seen>, Json(body): Json<serde_json::Value>| {
                let reply = reply.clone();
                async move {
                    seen.lock().unwrap().push((name.to_string(), body));
                    Json(reply)
                }
            }
        };
        let router = Router::new()
            .route("/sdapi/v1/txt2img", post(record("txt2img", reply.clone())))
            .route("/sdapi/v1/img2img", post(record("img2img", reply)))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn client(base_url: String) -> SdWebUiClient {
        SdWebUiClient::new(SdWebUiConfig {
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    fn request(reference: Option<std::path::PathBuf>) -> ImageRequest {
        ImageRequest {
            prompt: "round cat, waving".into(),
            negative_prompt: "lowres".into(),
            seed: 43,
            reference,
        }
    }

    #[tokio::test]
    async fn text_to_image_without_reference() {
        let (base, seen) = fake_webui().await;
        let bytes = client(base).generate(&request(None)).await.unwrap();
        assert_eq!(bytes, b"\x89PNG fake");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "txt2img");
        assert_eq!(seen[0].1["seed"], 43);
        assert_eq!(seen[0].1["width"], STAMP_WIDTH);
        assert!(seen[0].1.get("init_images").is_none());
    }

    #[tokio::test]
    async fn image_to_image_with_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.png");
        image::RgbImage::from_pixel(40, 40, image::Rgb([200, 100, 50]))
            .save(&path)
            .unwrap();

        let (base, seen) = fake_webui().await;
        client(base).generate(&request(Some(path))).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "img2img");
        assert_eq!(seen[0].1["init_images"].as_array().unwrap().len(), 1);
        assert!(seen[0].1["denoising_strength"].is_number());
    }

    #[tokio::test]
    async fn unreadable_reference_fails_the_call() {
        let (base, _) = fake_webui().await;
        let err = client(base)
            .generate(&request(Some("/nonexistent/reference.png".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Reference(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_request_error() {
        // Port 9 (discard) is never an HTTP server in the test environment.
        let err = client("http://127.0.0.1:9".into())
            .generate(&request(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Request(_)));
    }
}
