//! Shared fixtures for workflow tests.
//!
//! The fakes record every call so tests can assert on seeds, prompts and
//! references without a real generation service.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stampline_core::generation::{
    CharacterProposal, ClientError, ImageClient, ImagePromptRequest, ImageRequest, PromptClient,
};
use stampline_core::genre::Genre;
use stampline_core::notify::{Notification, NotificationSink, NotifyError};
use stampline_core::status::SetStatus;
use stampline_core::types::DbId;
use stampline_db::models::stamp::Stamp;
use stampline_db::models::stamp_set::StampSet;
use stampline_db::repositories::{StampRepo, StampSetRepo};
use stampline_db::{create_memory_pool, DbPool};
use stampline_events::EventBus;
use stampline_pipeline::{EngineConfig, EngineContext, WorkflowEngine};
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const DESCRIPTION: &str = "A round white cat with a red scarf";

// ---------------------------------------------------------------------------
// Prompt client
// ---------------------------------------------------------------------------

pub struct FakePrompts {
    pub phrases: Mutex<Vec<String>>,
    pub empty_proposals: AtomicBool,
    pub fail_image_prompts: AtomicBool,
    /// Hints received by `proposals` and `phrases`, in call order.
    pub hints: Mutex<Vec<Option<String>>>,
}

impl FakePrompts {
    pub fn new(phrase_count: usize) -> Self {
        Self {
            phrases: Mutex::new(phrases(phrase_count)),
            empty_proposals: AtomicBool::new(false),
            fail_image_prompts: AtomicBool::new(false),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn set_phrases(&self, count: usize) {
        *self.phrases.lock().unwrap() = phrases(count);
    }

    pub fn hints(&self) -> Vec<Option<String>> {
        self.hints.lock().unwrap().clone()
    }
}

/// `line 01`, `line 02`, ...
pub fn phrases(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("line {n:02}")).collect()
}

#[async_trait::async_trait]
impl PromptClient for FakePrompts {
    async fn proposals(
        &self,
        genre: Genre,
        hint: Option<&str>,
    ) -> Result<Vec<CharacterProposal>, ClientError> {
        self.hints.lock().unwrap().push(hint.map(str::to_string));
        if self.empty_proposals.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![
            CharacterProposal {
                name: "Mochi".into(),
                genre: genre.as_str().into(),
                description: DESCRIPTION.into(),
                base_prompt: "chibi white cat, flat colors".into(),
                consistency_hint: genre.requires_consistency(),
            },
            CharacterProposal {
                name: "Kuro".into(),
                genre: genre.as_str().into(),
                description: "A sleepy black cat".into(),
                base_prompt: "chibi black cat".into(),
                consistency_hint: genre.requires_consistency(),
            },
        ])
    }

    async fn phrases(
        &self,
        _character_description: &str,
        hint: Option<&str>,
    ) -> Result<Vec<String>, ClientError> {
        self.hints.lock().unwrap().push(hint.map(str::to_string));
        Ok(self.phrases.lock().unwrap().clone())
    }

    async fn image_prompt(&self, request: &ImagePromptRequest<'_>) -> Result<String, ClientError> {
        if self.fail_image_prompts.load(Ordering::SeqCst) {
            return Err(ClientError::Request("connection refused".into()));
        }
        let mut prompt = format!("prompt: {}", request.phrase);
        if let Some(m) = request.modification {
            prompt.push_str(&format!(", {m}"));
        }
        Ok(prompt)
    }
}

// ---------------------------------------------------------------------------
// Image client
// ---------------------------------------------------------------------------

pub struct FakeImages {
    pub calls: Mutex<Vec<ImageRequest>>,
    /// Calls whose prompt contains any of these fail.
    pub failing: Mutex<HashSet<String>>,
    /// When set, each call waits for a permit.
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeImages {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            gate: None,
        }
    }

    /// Calls block until permits are added to the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let images = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new()
        };
        (images, gate)
    }

    pub fn fail_on(&self, needle: &str) {
        self.failing.lock().unwrap().insert(needle.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<ImageRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Seeds used for calls whose prompt mentions `phrase`.
    pub fn seeds_for(&self, phrase: &str) -> Vec<i64> {
        self.calls()
            .iter()
            .filter(|c| c.prompt.contains(phrase))
            .map(|c| c.seed)
            .collect()
    }
}

#[async_trait::async_trait]
impl ImageClient for FakeImages {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>, ClientError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ClientError::Request(e.to_string()))?
                .forget();
        }
        self.calls.lock().unwrap().push(request.clone());
        let fails = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|needle| request.prompt.contains(needle.as_str()));
        if fails {
            return Err(ClientError::Timeout(300));
        }
        Ok(png_bytes())
    }
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(16, 16, image::Rgba([10, 120, 200, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

// ---------------------------------------------------------------------------
// Notification sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.text.clone())
            .collect()
    }

    /// Wait until a delivered notification contains `needle`.
    pub async fn wait_for(&self, needle: &str) -> bool {
        for _ in 0..200 {
            if self.texts().iter().any(|t| t.contains(needle)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: WorkflowEngine,
    pub pool: DbPool,
    pub prompts: Arc<FakePrompts>,
    pub images: Arc<FakeImages>,
    pub sink: Arc<RecordingSink>,
    pub events: Arc<EventBus>,
    pub config: EngineConfig,
    pub dir: TempDir,
}

pub async fn harness() -> Harness {
    harness_custom(FakeImages::new(), |_| {}).await
}

pub async fn harness_with(images: FakeImages) -> Harness {
    harness_custom(images, |_| {}).await
}

pub async fn harness_custom(
    images: FakeImages,
    configure: impl FnOnce(&mut EngineConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::rooted_at(dir.path());
    configure(&mut config);

    let pool = create_memory_pool().await.expect("in-memory pool");
    let prompts = Arc::new(FakePrompts::new(8));
    let images = Arc::new(images);
    let sink = Arc::new(RecordingSink::default());
    let events = Arc::new(EventBus::default());

    let engine = WorkflowEngine::new(
        EngineContext {
            pool: pool.clone(),
            prompts: prompts.clone(),
            images: images.clone(),
            sink: sink.clone(),
            events: events.clone(),
        },
        config.clone(),
    );

    Harness {
        engine,
        pool,
        prompts,
        images,
        sink,
        events,
        config,
        dir,
    }
}

impl Harness {
    pub async fn set(&self, id: DbId) -> StampSet {
        StampSetRepo::find_by_id(&self.pool, id)
            .await
            .unwrap()
            .expect("set exists")
    }

    pub async fn status(&self, id: DbId) -> SetStatus {
        self.set(id).await.status
    }

    pub async fn stamps(&self, id: DbId) -> Vec<Stamp> {
        StampRepo::list_by_set(&self.pool, id).await.unwrap()
    }

    /// A set that has passed direction and phrase generation.
    pub async fn set_with_phrases(&self, genre: Genre) -> DbId {
        let set = self.engine.create_set("Cat", genre).await.unwrap();
        self.engine
            .request_proposals(set.id, None)
            .await
            .unwrap()
            .join()
            .await;
        self.engine
            .approve_direction(set.id, 1)
            .await
            .unwrap()
            .join()
            .await;
        assert_eq!(self.status(set.id).await, SetStatus::PatternsApproved);
        set.id
    }

    /// A set whose samples are waiting for review.
    pub async fn set_in_sample_review(&self, genre: Genre) -> DbId {
        let id = self.set_with_phrases(genre).await;
        self.engine.generate_samples(id).await.unwrap().join().await;
        assert_eq!(self.status(id).await, SetStatus::SamplesReview);
        id
    }

    /// A completed, exported set.
    pub async fn completed_set(&self) -> DbId {
        let id = self.set_in_sample_review(Genre::Animal).await;
        self.engine.approve_samples(id).await.unwrap().join().await;
        assert_eq!(self.status(id).await, SetStatus::Completed);
        id
    }
}
