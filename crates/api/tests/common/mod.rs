//! Shared helpers for API integration tests.
//!
//! Builds the production router over an in-memory database and a workflow
//! engine wired to in-process fakes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use stampline_core::generation::{
    CharacterProposal, ClientError, ImageClient, ImagePromptRequest, ImageRequest, PromptClient,
};
use stampline_core::genre::Genre;
use stampline_core::notify::{Notification, NotificationSink, NotifyError};
use stampline_core::status::SetStatus;
use stampline_core::types::DbId;
use stampline_db::repositories::StampSetRepo;
use stampline_db::{create_memory_pool, DbPool};
use stampline_events::EventBus;
use stampline_pipeline::{EngineConfig, EngineContext, WorkflowEngine};
use tempfile::TempDir;
use tower::ServiceExt;

use stampline_api::config::ServerConfig;
use stampline_api::router::build_app_router;
use stampline_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: "sqlite::memory:".to_string(),
        json_logs: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub engine: WorkflowEngine,
    pub pool: DbPool,
    pub dir: TempDir,
}

/// The full application router over an in-memory database.
pub async fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_memory_pool().await.expect("in-memory pool");
    let engine = WorkflowEngine::new(
        EngineContext {
            pool: pool.clone(),
            prompts: Arc::new(FakePrompts),
            images: Arc::new(FakeImages),
            sink: Arc::new(NullSink),
            events: Arc::new(EventBus::default()),
        },
        EngineConfig::rooted_at(dir.path()),
    );

    let config = test_config();
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        engine: engine.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        engine,
        pool,
        dir,
    }
}

impl TestApp {
    pub async fn status(&self, id: DbId) -> SetStatus {
        StampSetRepo::find_by_id(&self.pool, id)
            .await
            .unwrap()
            .expect("set exists")
            .status
    }

    /// Wait until no background task owns the set.
    pub async fn settle(&self, id: DbId) {
        for _ in 0..300 {
            if !self.engine.is_busy(id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("set {id} still busy");
    }

    /// Drive a set through every stage to `completed`.
    pub async fn completed_set(&self) -> DbId {
        let set = self.engine.create_set("Cat", Genre::Animal).await.unwrap();
        let id = set.id;
        self.engine.request_proposals(id, None).await.unwrap().join().await;
        self.engine.approve_direction(id, 1).await.unwrap().join().await;
        self.engine.generate_samples(id).await.unwrap().join().await;
        self.engine.approve_samples(id).await.unwrap().join().await;
        assert_eq!(self.status(id).await, SetStatus::Completed);
        id
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_bytes(app: &Router, uri: &str, bytes: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

pub struct FakePrompts;

#[async_trait::async_trait]
impl PromptClient for FakePrompts {
    async fn proposals(
        &self,
        genre: Genre,
        _hint: Option<&str>,
    ) -> Result<Vec<CharacterProposal>, ClientError> {
        Ok(vec![CharacterProposal {
            name: "Mochi".into(),
            genre: genre.as_str().into(),
            description: "A round white cat".into(),
            base_prompt: "chibi white cat".into(),
            consistency_hint: genre.requires_consistency(),
        }])
    }

    async fn phrases(
        &self,
        _character_description: &str,
        _hint: Option<&str>,
    ) -> Result<Vec<String>, ClientError> {
        Ok((1..=8).map(|n| format!("line {n:02}")).collect())
    }

    async fn image_prompt(&self, request: &ImagePromptRequest<'_>) -> Result<String, ClientError> {
        Ok(format!("prompt: {}", request.phrase))
    }
}

pub struct FakeImages;

#[async_trait::async_trait]
impl ImageClient for FakeImages {
    async fn generate(&self, _request: &ImageRequest) -> Result<Vec<u8>, ClientError> {
        Ok(png_bytes())
    }
}

pub struct NullSink;

#[async_trait::async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(16, 16, image::Rgba([10, 120, 200, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
