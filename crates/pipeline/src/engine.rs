//! Workflow engine.
//!
//! Every public operation follows the same order: load and validate the
//! set, claim its registry slot, apply the synchronous mutation, then
//! spawn the background stage. A rejected operation never mutates
//! anything. Stage bodies return `Result`; the stage boundary turns an
//! error into a log line, a `stage.failed` event and a chat message with
//! a retry button where one applies.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use stampline_core::generation::{
    ImageClient, ImagePromptRequest, ImageRequest, PromptClient, DEFAULT_NEGATIVE_PROMPT,
};
use stampline_core::genre::Genre;
use stampline_core::naming;
use stampline_core::notify::{Notification, NotificationSink};
use stampline_core::seed::{self, SeedPolicy};
use stampline_core::status::{ModelStatus, SetStatus, StampStatus};
use stampline_core::training::TrainingCommand;
use stampline_core::trigger;
use stampline_core::types::DbId;
use stampline_db::models::stamp::{CreateStamp, Stamp};
use stampline_db::models::stamp_set::{
    ApprovedDirection, CreateStampSet, CreateVariation, StampSet,
};
use stampline_db::repositories::{StampRepo, StampSetRepo};
use stampline_db::DbPool;
use stampline_events::bus::{
    ENTITY_STAMP, ENTITY_STAMP_SET, EVENT_EXPORTED, EVENT_MODEL_TRAINED, EVENT_STAMP_FAILED,
};
use stampline_events::{EventBus, PlatformEvent};
use tokio::task::JoinError;

use crate::composite::{self, GridEntry, FULL_COLUMNS, SAMPLE_COLUMNS};
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::export::{self, ExportSummary};
use crate::messages;
use crate::notifier::Notifier;
use crate::registry::{TaskHandle, TaskRegistry, TaskSlot};

/// A progress message is sent after every this many completed stamps.
const PROGRESS_EVERY: usize = 5;

/// Longest accepted set name.
const MAX_NAME_LEN: usize = 100;

/// Statuses in which single stamps may be reviewed or redone.
const REVIEW_STATUSES: &[SetStatus] = &[
    SetStatus::SamplesReview,
    SetStatus::FullReview,
    SetStatus::Completed,
];

/// Statuses re-dispatched by [`WorkflowEngine::resume_interrupted`].
///
/// `full_review` is only ever held between the last stamp and completion.
const INTERRUPTED_STATUSES: &[SetStatus] = &[
    SetStatus::SamplesGenerating,
    SetStatus::FullGenerating,
    SetStatus::FullReview,
];

/// Handles the engine is constructed with.
pub struct EngineContext {
    pub pool: DbPool,
    pub prompts: Arc<dyn PromptClient>,
    pub images: Arc<dyn ImageClient>,
    pub sink: Arc<dyn NotificationSink>,
    pub events: Arc<EventBus>,
}

/// Background stage kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Proposals,
    Phrases,
    Samples,
    Full,
    Regenerate,
    Training,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Proposals => "proposals",
            Stage::Phrases => "phrases",
            Stage::Samples => "samples",
            Stage::Full => "full",
            Stage::Regenerate => "regenerate",
            Stage::Training => "training",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Stage::Proposals => "Character proposals",
            Stage::Phrases => "Phrase generation",
            Stage::Samples => "Sample generation",
            Stage::Full => "Full generation",
            Stage::Regenerate => "Stamp regeneration",
            Stage::Training => "Model training",
        }
    }

    /// Button that re-enters the stage after a failure.
    fn retry_action(self) -> Option<&'static str> {
        match self {
            Stage::Proposals => Some(trigger::ACTION_REQUEST_PROPOSALS),
            Stage::Phrases | Stage::Samples | Stage::Full => {
                Some(trigger::ACTION_RESUME_GENERATION)
            }
            Stage::Regenerate => None,
            Stage::Training => Some(trigger::ACTION_TRAIN_MODEL),
        }
    }
}

/// Outcome of [`WorkflowEngine::start_direction`].
#[derive(Debug)]
pub enum DirectionStart {
    /// Waiting for the reference upload; nothing was started.
    AwaitingReference,
    Started(TaskHandle),
}

struct Inner {
    ctx: EngineContext,
    config: EngineConfig,
    registry: TaskRegistry,
    notifier: Notifier,
}

/// Drives stamp sets through the workflow.
///
/// Cheap to clone; clones share the task registry.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<Inner>,
}

impl WorkflowEngine {
    pub fn new(ctx: EngineContext, config: EngineConfig) -> Self {
        let registry = TaskRegistry::new(config.max_concurrent_tasks);
        let notifier = Notifier::new(Arc::clone(&ctx.sink));
        Self {
            inner: Arc::new(Inner {
                ctx,
                config,
                registry,
                notifier,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Whether a background task currently owns the set.
    pub fn is_busy(&self, set_id: DbId) -> bool {
        self.inner.registry.is_active(set_id)
    }

    /// Stop accepting new stage triggers. Running stages finish.
    pub fn shutdown(&self) {
        tracing::info!(
            active = self.inner.registry.active_count(),
            "Workflow engine shutting down"
        );
        self.inner.registry.shutdown();
    }

    // -----------------------------------------------------------------------
    // Direction
    // -----------------------------------------------------------------------

    /// Create a set in `direction_pending`.
    pub async fn create_set(&self, name: &str, genre: Genre) -> Result<StampSet, WorkflowError> {
        let name = validate_name(name)?;
        let set = StampSetRepo::create(
            self.pool(),
            &CreateStampSet {
                name: name.to_string(),
                genre,
            },
        )
        .await?;
        tracing::info!(set_id = set.id, name = %set.name, genre = %set.genre, "Stamp set created");
        Ok(set)
    }

    /// Name used when a set is created without one.
    pub fn default_set_name() -> String {
        format!("Stamp set {}", Utc::now().format("%Y-%m-%d %H:%M"))
    }

    /// Change the genre, and with it the consistency flag.
    pub async fn select_genre(&self, set_id: DbId, genre: Genre) -> Result<StampSet, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::DirectionPending], "select a genre")?;
        if self.is_busy(set_id) {
            return Err(busy(set_id));
        }
        let set = StampSetRepo::select_genre(self.pool(), set_id, genre)
            .await?
            .ok_or(WorkflowError::set_not_found(set_id))?;
        tracing::info!(set_id, genre = %genre, consistency = set.character_consistency, "Genre selected");
        Ok(set)
    }

    /// Begin the direction stage.
    ///
    /// When a reference image is expected and none is attached yet, this
    /// only records the wait; [`Self::attach_reference`] starts the
    /// proposals once the upload arrives.
    pub async fn start_direction(
        &self,
        set_id: DbId,
        has_reference: bool,
    ) -> Result<DirectionStart, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::DirectionPending], "start character direction")?;
        if has_reference && set.reference_image_path.is_none() {
            tracing::info!(set_id, "Waiting for reference image upload");
            return Ok(DirectionStart::AwaitingReference);
        }
        let hint = set.variation_theme.clone();
        self.spawn_proposals(set_id, hint).map(DirectionStart::Started)
    }

    /// Ask for a fresh round of character proposals.
    pub async fn request_proposals(
        &self,
        set_id: DbId,
        hint: Option<String>,
    ) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::DirectionPending], "request character proposals")?;
        let hint = hint.or(set.variation_theme);
        self.spawn_proposals(set_id, hint)
    }

    /// Store an uploaded reference image and start the proposals.
    pub async fn attach_reference(
        &self,
        set_id: DbId,
        bytes: Vec<u8>,
    ) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::DirectionPending], "attach a reference image")?;
        if bytes.is_empty() {
            return Err(WorkflowError::Validation(
                "Reference image upload is empty".to_string(),
            ));
        }
        let slot = self.inner.registry.try_claim(set_id)?;

        let path = self.set_dir(set_id).join(naming::REFERENCE_FILE);
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), WorkflowError> {
            let img = image::load_from_memory(&bytes).map_err(|e| {
                WorkflowError::Validation(format!("Reference upload is not a readable image: {e}"))
            })?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            img.save_with_format(&target, image::ImageFormat::Png)?;
            Ok(())
        })
        .await
        .map_err(join_error)??;

        StampSetRepo::set_reference(self.pool(), set_id, &path.to_string_lossy()).await?;
        tracing::info!(set_id, path = %path.display(), "Reference image stored");

        let engine = self.clone();
        let hint = set.variation_theme;
        Ok(self.spawn_stage(slot, Stage::Proposals, async move {
            engine.run_proposals(set_id, hint).await
        }))
    }

    /// Approve proposal `proposal_index` (1-based) and start phrase
    /// generation.
    pub async fn approve_direction(
        &self,
        set_id: DbId,
        proposal_index: usize,
    ) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_transition(SetStatus::DirectionApproved, "approve a direction")?;
        let proposals = set.proposals();
        let chosen = proposal_index
            .checked_sub(1)
            .and_then(|i| proposals.get(i))
            .ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "Proposal {proposal_index} does not exist; {} available",
                    proposals.len()
                ))
            })?;
        let direction = ApprovedDirection {
            description: chosen.description.clone(),
            base_prompt: chosen.base_prompt.clone(),
            character_consistency: chosen.consistency_hint,
        };
        let slot = self.inner.registry.try_claim(set_id)?;

        StampSetRepo::approve_direction(self.pool(), set_id, &direction)
            .await?
            .ok_or_else(|| busy(set_id))?;
        self.publish_status(set_id, SetStatus::DirectionPending, SetStatus::DirectionApproved);
        tracing::info!(set_id, proposal = proposal_index, name = %chosen.name, "Direction approved");

        self.transition(
            set_id,
            SetStatus::DirectionApproved,
            SetStatus::PatternsPending,
            "generate phrases",
        )
        .await?;

        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Phrases, async move {
            engine.run_phrases(set_id, None).await
        }))
    }

    // -----------------------------------------------------------------------
    // Phrases
    // -----------------------------------------------------------------------

    /// Run phrase generation for a set in `patterns_pending`.
    ///
    /// A failed run leaves the status unchanged, so this is also the retry.
    pub async fn generate_phrases(
        &self,
        set_id: DbId,
        hint: Option<String>,
    ) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::PatternsPending], "generate phrases")?;
        let slot = self.inner.registry.try_claim(set_id)?;
        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Phrases, async move {
            engine.run_phrases(set_id, hint).await
        }))
    }

    /// Discard the phrase list and generate a new one.
    pub async fn regenerate_phrases(
        &self,
        set_id: DbId,
        hint: Option<String>,
    ) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        if set.status == SetStatus::PatternsPending {
            return self.generate_phrases(set_id, hint).await;
        }
        set.status
            .ensure_transition(SetStatus::PatternsPending, "regenerate phrases")?;
        let slot = self.inner.registry.try_claim(set_id)?;

        self.transition(
            set_id,
            SetStatus::PatternsApproved,
            SetStatus::PatternsPending,
            "regenerate phrases",
        )
        .await?;
        let removed = StampRepo::delete_for_set(self.pool(), set_id).await?;
        tracing::info!(set_id, removed, "Phrase list discarded");

        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Phrases, async move {
            engine.run_phrases(set_id, hint).await
        }))
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    /// Generate the sample batch.
    ///
    /// From `patterns_approved` or `samples_review` every sample is
    /// (re)generated. From `samples_generating` the stage resumes and only
    /// samples without an artifact are generated.
    pub async fn generate_samples(&self, set_id: DbId) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_transition(SetStatus::SamplesGenerating, "generate samples")?;
        let samples = StampRepo::list_samples(self.pool(), set_id).await?;
        if samples.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Stamp set {set_id} has no phrases to sample"
            )));
        }
        let slot = self.inner.registry.try_claim(set_id)?;

        let resume = set.status == SetStatus::SamplesGenerating;
        self.transition(set_id, set.status, SetStatus::SamplesGenerating, "generate samples")
            .await?;

        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Samples, async move {
            engine.run_samples(set_id, resume).await
        }))
    }

    /// Accept the samples and generate the rest of the set.
    pub async fn approve_samples(&self, set_id: DbId) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::SamplesReview], "approve samples")?;
        if self.inner.registry.is_active(set_id) {
            return Err(WorkflowError::Conflict(format!(
                "Stamp set {set_id} already has a stage running"
            )));
        }

        for sample in StampRepo::list_samples(self.pool(), set_id).await? {
            if sample.is_generated() {
                StampRepo::update_status(self.pool(), sample.id, StampStatus::Approved).await?;
            }
        }
        self.generate_full(set_id).await
    }

    /// Throw the samples away and generate a new batch.
    pub async fn reject_samples(&self, set_id: DbId) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::SamplesReview], "reject samples")?;
        tracing::info!(set_id, "Samples rejected");
        self.generate_samples(set_id).await
    }

    /// Generate every stamp that has no artifact yet.
    ///
    /// Re-invoking while the set is `full_generating` resumes the batch.
    pub async fn generate_full(&self, set_id: DbId) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_transition(SetStatus::FullGenerating, "generate the full set")?;
        let slot = self.inner.registry.try_claim(set_id)?;

        self.transition(set_id, set.status, SetStatus::FullGenerating, "generate the full set")
            .await?;

        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Full, async move {
            engine.run_full(set_id).await
        }))
    }

    /// Re-enter whichever stage the set is stuck in.
    pub async fn resume(&self, set_id: DbId) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        match set.status {
            SetStatus::SamplesGenerating => self.generate_samples(set_id).await,
            SetStatus::FullGenerating => self.generate_full(set_id).await,
            SetStatus::FullReview => self.finish_full(set_id).await,
            SetStatus::PatternsPending => self.generate_phrases(set_id, None).await,
            other => Err(WorkflowError::InvalidTransition {
                action: "resume generation".to_string(),
                from: other.to_string(),
            }),
        }
    }

    /// Complete a set whose stamps are all generated but which stopped
    /// short of `completed`.
    async fn finish_full(&self, set_id: DbId) -> Result<TaskHandle, WorkflowError> {
        let slot = self.inner.registry.try_claim(set_id)?;
        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Full, async move {
            engine.run_full(set_id).await
        }))
    }

    /// Re-dispatch every set left in a generating status, e.g. by a
    /// restart.
    ///
    /// Sets still marked as training with no task behind them are reset so
    /// training can be started again.
    pub async fn resume_interrupted(&self) -> Result<Vec<TaskHandle>, WorkflowError> {
        self.reset_stale_training().await?;

        let sets = StampSetRepo::list_by_status(self.pool(), INTERRUPTED_STATUSES).await?;
        let mut handles = Vec::with_capacity(sets.len());
        for set in sets {
            match self.resume(set.id).await {
                Ok(handle) => {
                    tracing::info!(set_id = set.id, status = %set.status, "Interrupted stage resumed");
                    handles.push(handle);
                }
                Err(e) => {
                    tracing::warn!(set_id = set.id, error = %e, "Could not resume interrupted stage");
                }
            }
        }
        Ok(handles)
    }

    async fn reset_stale_training(&self) -> Result<(), WorkflowError> {
        let sets = StampSetRepo::list_by_model_status(self.pool(), ModelStatus::Training).await?;
        for set in sets {
            if self.inner.registry.is_active(set.id) {
                continue;
            }
            StampSetRepo::update_model(self.pool(), set.id, ModelStatus::Untrained, None).await?;
            tracing::warn!(set_id = set.id, "Interrupted training reset");
            self.notify(messages::stage_failed(
                set.id,
                Stage::Training.label(),
                "interrupted by a restart",
                Stage::Training.retry_action(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Single stamps
    // -----------------------------------------------------------------------

    /// Regenerate one stamp, optionally with a reviewer's modification.
    ///
    /// The set's status is left alone.
    pub async fn regenerate_stamp(
        &self,
        set_id: DbId,
        stamp_id: DbId,
        modification: Option<String>,
    ) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status.ensure_one_of(REVIEW_STATUSES, "regenerate a stamp")?;
        let stamp = self.load_stamp(set_id, stamp_id).await?;
        let slot = self.inner.registry.try_claim(set_id)?;

        StampRepo::begin_retry(self.pool(), stamp.id)
            .await?
            .ok_or(WorkflowError::stamp_not_found(stamp_id))?;

        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Regenerate, async move {
            engine.run_regenerate(set_id, stamp_id, modification).await
        }))
    }

    /// Mark one generated stamp as approved.
    pub async fn approve_stamp(&self, set_id: DbId, stamp_id: DbId) -> Result<Stamp, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status.ensure_one_of(REVIEW_STATUSES, "approve a stamp")?;
        let stamp = self.load_stamp(set_id, stamp_id).await?;
        if !stamp.is_generated() {
            return Err(WorkflowError::Validation(format!(
                "Stamp {stamp_id} has no image to approve"
            )));
        }
        StampRepo::update_status(self.pool(), stamp_id, StampStatus::Approved).await?;
        tracing::info!(set_id, stamp_id, ordinal = stamp.number, "Stamp approved");
        self.load_stamp(set_id, stamp_id).await
    }

    // -----------------------------------------------------------------------
    // Export, training, variations
    // -----------------------------------------------------------------------

    /// Export the set's generated stamps as training data.
    pub async fn export_training_data(&self, set_id: DbId) -> Result<ExportSummary, WorkflowError> {
        let set = self.load_set(set_id).await?;
        let counts = StampRepo::counts(self.pool(), set_id).await?;
        if counts.generated == 0 {
            return Err(WorkflowError::Validation(format!(
                "Stamp set {} has no generated stamps to export",
                set.id
            )));
        }
        let _slot = self.inner.registry.try_claim(set_id)?;
        let stamps = StampRepo::list_by_set(self.pool(), set_id).await?;
        self.export_stamps(set_id, &stamps).await
    }

    /// Train a derived model from a completed, exported set.
    pub async fn train_model(&self, set_id: DbId) -> Result<TaskHandle, WorkflowError> {
        let set = self.load_set(set_id).await?;
        set.status
            .ensure_one_of(&[SetStatus::Completed], "train a model")?;
        if !set.exported {
            return Err(WorkflowError::Validation(format!(
                "Stamp set {set_id} has no exported training data"
            )));
        }
        if set.lora_status == ModelStatus::Training && self.inner.registry.is_active(set_id) {
            return Err(WorkflowError::Conflict(format!(
                "A model is already training for stamp set {set_id}"
            )));
        }
        let slot = self.inner.registry.try_claim(set_id)?;
        StampSetRepo::update_model(self.pool(), set_id, ModelStatus::Training, None).await?;

        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Training, async move {
            engine.run_training(set_id).await
        }))
    }

    /// Start a new set derived from a completed one.
    ///
    /// The theme steers the new set's proposals and phrases.
    pub async fn create_variation(
        &self,
        parent_id: DbId,
        theme: &str,
    ) -> Result<(StampSet, TaskHandle), WorkflowError> {
        let theme = theme.trim();
        if theme.is_empty() {
            return Err(WorkflowError::Validation(
                "A variation needs a theme".to_string(),
            ));
        }
        let parent = self.load_set(parent_id).await?;
        parent
            .status
            .ensure_one_of(&[SetStatus::Completed], "create a variation")?;

        let name = format!("{} ({theme})", parent.name);
        let set = StampSetRepo::create_variation(
            self.pool(),
            &CreateVariation {
                parent: &parent,
                name: validate_name(&name)?.to_string(),
                theme: theme.to_string(),
            },
        )
        .await?;
        tracing::info!(set_id = set.id, parent_id, theme, "Variation created");

        let handle = self.spawn_proposals(set.id, Some(theme.to_string()))?;
        Ok((set, handle))
    }

    // -----------------------------------------------------------------------
    // Stage bodies
    // -----------------------------------------------------------------------

    async fn run_proposals(&self, set_id: DbId, hint: Option<String>) -> Result<(), WorkflowError> {
        let set = self.load_set(set_id).await?;
        let proposals = self
            .inner
            .ctx
            .prompts
            .proposals(set.genre, hint.as_deref())
            .await?;
        if proposals.is_empty() {
            return Err(WorkflowError::Parse(
                "No character proposals were returned".to_string(),
            ));
        }
        StampSetRepo::store_proposals(self.pool(), set_id, &proposals).await?;
        tracing::info!(set_id, count = proposals.len(), "Character proposals stored");
        self.notify(messages::proposals(&set, &proposals));
        Ok(())
    }

    async fn run_phrases(&self, set_id: DbId, hint: Option<String>) -> Result<(), WorkflowError> {
        let set = self.load_set(set_id).await?;
        let description = set
            .character_description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "Stamp set {set_id} has no approved character description"
                ))
            })?;
        let hint = hint.or_else(|| set.variation_theme.clone());

        let phrases = self
            .inner
            .ctx
            .prompts
            .phrases(description, hint.as_deref())
            .await?;
        if phrases.is_empty() {
            return Err(WorkflowError::Parse("No phrases were returned".to_string()));
        }

        let inputs: Vec<CreateStamp> = phrases
            .into_iter()
            .map(|phrase| CreateStamp {
                phrase,
                negative_prompt: None,
            })
            .collect();
        let stamps = StampRepo::replace_for_set(self.pool(), set_id, &inputs).await?;
        let set = self
            .transition(
                set_id,
                SetStatus::PatternsPending,
                SetStatus::PatternsApproved,
                "store phrases",
            )
            .await?;
        tracing::info!(set_id, count = stamps.len(), "Phrases stored");
        self.notify(messages::phrases(&set, &stamps));
        Ok(())
    }

    async fn run_samples(&self, set_id: DbId, resume: bool) -> Result<(), WorkflowError> {
        let set = self.load_set(set_id).await?;
        let policy = self.seed_policy(&set).await?;
        let samples = StampRepo::list_samples(self.pool(), set_id).await?;
        let pending: Vec<&Stamp> = samples
            .iter()
            .filter(|s| !(resume && s.is_generated()))
            .collect();
        self.notify(messages::samples_started(set_id, pending.len()));

        let mut failed = 0;
        for stamp in pending {
            if let Err(e) = self.generate_one(&set, stamp, policy, None).await {
                failed += 1;
                self.record_item_failure(set_id, stamp, &e);
            }
        }

        let samples = StampRepo::list_samples(self.pool(), set_id).await?;
        self.render_preview(set_id, &samples, SAMPLE_COLUMNS, naming::SAMPLE_GRID_FILE)
            .await?;
        let set = self
            .transition(
                set_id,
                SetStatus::SamplesGenerating,
                SetStatus::SamplesReview,
                "finish samples",
            )
            .await?;
        tracing::info!(set_id, count = samples.len(), failed, "Sample batch finished");
        self.notify(messages::samples_ready(
            &set,
            &samples,
            failed,
            &self.inner.config.files_url_prefix,
        ));
        Ok(())
    }

    async fn run_full(&self, set_id: DbId) -> Result<(), WorkflowError> {
        let set = self.load_set(set_id).await?;
        let policy = self.seed_policy(&set).await?;
        let stamps = StampRepo::list_by_set(self.pool(), set_id).await?;
        let total = stamps.len();
        let mut done = stamps.iter().filter(|s| s.is_generated()).count();
        let pending: Vec<&Stamp> = stamps.iter().filter(|s| !s.is_generated()).collect();

        if !pending.is_empty() {
            tracing::info!(set_id, remaining = pending.len(), total, "Full batch started");
            self.notify(messages::full_started(set_id, pending.len(), total));
        }

        let mut failed = 0;
        let last = pending.len();
        for (i, stamp) in pending.into_iter().enumerate() {
            match self.generate_one(&set, stamp, policy, None).await {
                Ok(_) => {
                    done += 1;
                    if done % PROGRESS_EVERY == 0 || i + 1 == last {
                        self.notify(messages::progress(set_id, done, total));
                    }
                }
                Err(e) => {
                    failed += 1;
                    self.record_item_failure(set_id, stamp, &e);
                }
            }
        }

        if failed > 0 {
            tracing::warn!(set_id, failed, total, "Full batch incomplete, awaiting resume");
            self.notify(messages::full_incomplete(set_id, failed, total));
            return Ok(());
        }

        let stamps = StampRepo::list_by_set(self.pool(), set_id).await?;
        self.render_preview(set_id, &stamps, FULL_COLUMNS, naming::FULL_GRID_FILE)
            .await?;
        let summary = self.export_stamps(set_id, &stamps).await?;

        if set.status == SetStatus::FullGenerating {
            self.transition(
                set_id,
                SetStatus::FullGenerating,
                SetStatus::FullReview,
                "finish full set",
            )
            .await?;
        }
        let set = self
            .transition(
                set_id,
                SetStatus::FullReview,
                SetStatus::Completed,
                "complete set",
            )
            .await?;
        tracing::info!(set_id, total, exported = summary.exported, "Stamp set completed");
        self.notify(messages::completed(
            &set,
            &summary,
            &self.inner.config.files_url_prefix,
        ));
        Ok(())
    }

    async fn run_regenerate(
        &self,
        set_id: DbId,
        stamp_id: DbId,
        modification: Option<String>,
    ) -> Result<(), WorkflowError> {
        let result = async {
            let set = self.load_set(set_id).await?;
            let stamp = self.load_stamp(set_id, stamp_id).await?;
            let policy = self.seed_policy(&set).await?;
            let stamp = self
                .generate_one(&set, &stamp, policy, modification.as_deref())
                .await?;
            Ok::<_, WorkflowError>((set, stamp))
        }
        .await;
        StampRepo::update_status(self.pool(), stamp_id, StampStatus::Pending).await?;
        let (set, stamp) = result?;

        let (stamps, columns, file) = if set.status == SetStatus::SamplesReview {
            (
                StampRepo::list_samples(self.pool(), set_id).await?,
                SAMPLE_COLUMNS,
                naming::SAMPLE_GRID_FILE,
            )
        } else {
            (
                StampRepo::list_by_set(self.pool(), set_id).await?,
                FULL_COLUMNS,
                naming::FULL_GRID_FILE,
            )
        };
        self.render_preview(set_id, &stamps, columns, file).await?;

        tracing::info!(
            set_id,
            stamp_id,
            ordinal = stamp.number,
            retry_count = stamp.retry_count,
            "Stamp regenerated"
        );
        self.notify(messages::stamp_regenerated(
            set_id,
            &stamp,
            &self.inner.config.files_url_prefix,
        ));
        Ok(())
    }

    async fn run_training(&self, set_id: DbId) -> Result<(), WorkflowError> {
        let config = &self.inner.config;
        let command = TrainingCommand::for_set(
            set_id,
            config.training_script.clone(),
            config.base_model_path.clone(),
            config.export_dir.join(naming::set_dir_name(set_id)),
            &config.models_dir,
        )
        .with_interpreter(config.training_interpreter.clone());

        tracing::info!(set_id, output = %command.expected_output().display(), "Model training started");
        self.notify(messages::training_started(set_id));

        match command.run().await {
            Ok(outcome) => {
                let path = outcome.model_path.to_string_lossy().into_owned();
                StampSetRepo::update_model(self.pool(), set_id, ModelStatus::Completed, Some(&path))
                    .await?;
                self.inner.ctx.events.publish(
                    PlatformEvent::new(EVENT_MODEL_TRAINED)
                        .with_source(ENTITY_STAMP_SET, set_id)
                        .with_payload(json!({
                            "model_path": path,
                            "duration_ms": outcome.duration_ms,
                        })),
                );
                tracing::info!(set_id, duration_ms = outcome.duration_ms, "Model training finished");
                self.notify(messages::training_finished(set_id, &path));
                Ok(())
            }
            Err(e) => {
                StampSetRepo::update_model(self.pool(), set_id, ModelStatus::Untrained, None)
                    .await?;
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Per-stamp generation
    // -----------------------------------------------------------------------

    /// Generate one stamp's artifact and record it.
    ///
    /// The prompt is authored on first use (or when a modification is
    /// requested) and persisted. The seed is persisted before the image
    /// call so a crash mid-call still leaves the seed that was used.
    async fn generate_one(
        &self,
        set: &StampSet,
        stamp: &Stamp,
        policy: SeedPolicy,
        modification: Option<&str>,
    ) -> Result<Stamp, WorkflowError> {
        let pool = self.pool();

        let mut prompt = stamp.prompt.trim().to_string();
        if prompt.is_empty() || modification.is_some() {
            prompt = self.author_prompt(set, stamp, modification).await;
            StampRepo::set_prompt(pool, stamp.id, &prompt).await?;
        }
        if let Some(tag) = self.derived_model_tag(set).await {
            prompt = format!("{prompt}, {tag}");
        }

        let negative_prompt = stamp
            .negative_prompt
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_NEGATIVE_PROMPT)
            .to_string();
        let seed = policy.seed_for(stamp.number, &mut rand::rng());
        StampRepo::set_seed(pool, stamp.id, seed).await?;

        let reference = set
            .character_consistency
            .then(|| set.reference_image_path.as_deref().map(PathBuf::from))
            .flatten();
        let request = ImageRequest {
            prompt,
            negative_prompt,
            seed,
            reference,
        };
        let bytes = self.inner.ctx.images.generate(&request).await?;

        let path = self
            .set_dir(set.id)
            .join(naming::stamp_file_name(stamp.number));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        StampRepo::set_image_path(pool, stamp.id, &path.to_string_lossy()).await?;

        tracing::debug!(
            set_id = set.id,
            stamp_id = stamp.id,
            ordinal = stamp.number,
            seed,
            bytes = bytes.len(),
            "Stamp generated"
        );
        self.load_stamp(set.id, stamp.id).await
    }

    /// Ask the prompt service for a stamp's image prompt, falling back to
    /// `"{base_prompt}, {phrase}"`.
    async fn author_prompt(&self, set: &StampSet, stamp: &Stamp, modification: Option<&str>) -> String {
        let base_prompt = set.base_prompt.as_deref().unwrap_or_default();
        let request = ImagePromptRequest {
            phrase: &stamp.phrase,
            character_description: set.character_description.as_deref().unwrap_or_default(),
            base_prompt,
            modification,
        };
        match self.inner.ctx.prompts.image_prompt(&request).await {
            Ok(p) if !p.trim().is_empty() => p.trim().to_string(),
            result => {
                if let Err(e) = result {
                    tracing::warn!(set_id = set.id, stamp_id = stamp.id, error = %e, "Prompt authoring failed, using fallback");
                }
                let mut fallback = if base_prompt.trim().is_empty() {
                    stamp.phrase.clone()
                } else {
                    format!("{base_prompt}, {}", stamp.phrase)
                };
                if let Some(m) = modification.filter(|m| !m.trim().is_empty()) {
                    fallback = format!("{fallback}, {m}");
                }
                fallback
            }
        }
    }

    /// Tag for the set's own trained model, when one is on disk.
    async fn derived_model_tag(&self, set: &StampSet) -> Option<String> {
        if set.lora_status != ModelStatus::Completed {
            return None;
        }
        let path = set.lora_model_path.as_deref()?;
        tokio::fs::try_exists(path)
            .await
            .unwrap_or(false)
            .then(|| naming::derived_model_tag(set.id))
    }

    /// Seed policy for `set`, establishing the base seed on first use.
    async fn seed_policy(&self, set: &StampSet) -> Result<SeedPolicy, WorkflowError> {
        if let Some(policy) = SeedPolicy::for_set(set.character_consistency, set.base_seed) {
            return Ok(policy);
        }
        let candidate = seed::draw_seed(&mut rand::rng());
        let base = StampSetRepo::set_base_seed_if_absent(self.pool(), set.id, candidate)
            .await?
            .ok_or(WorkflowError::set_not_found(set.id))?;
        tracing::info!(set_id = set.id, base_seed = base, "Base seed established");
        Ok(SeedPolicy::Derived { base })
    }

    fn record_item_failure(&self, set_id: DbId, stamp: &Stamp, error: &WorkflowError) {
        tracing::warn!(
            set_id,
            stamp_id = stamp.id,
            ordinal = stamp.number,
            error = %error,
            "Stamp generation failed, continuing with the batch"
        );
        self.inner.ctx.events.publish(
            PlatformEvent::new(EVENT_STAMP_FAILED)
                .with_source(ENTITY_STAMP, stamp.id)
                .with_payload(json!({
                    "set_id": set_id,
                    "ordinal": stamp.number,
                    "kind": error.kind(),
                    "message": error.to_string(),
                })),
        );
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    pub fn pool(&self) -> &DbPool {
        &self.inner.ctx.pool
    }

    fn set_dir(&self, set_id: DbId) -> PathBuf {
        self.inner
            .config
            .output_dir
            .join(naming::set_dir_name(set_id))
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.inner.notifier.send(notification);
    }

    async fn load_set(&self, set_id: DbId) -> Result<StampSet, WorkflowError> {
        StampSetRepo::find_by_id(self.pool(), set_id)
            .await?
            .ok_or(WorkflowError::set_not_found(set_id))
    }

    /// Load a stamp, treating a stamp of another set as missing.
    async fn load_stamp(&self, set_id: DbId, stamp_id: DbId) -> Result<Stamp, WorkflowError> {
        StampRepo::find_by_id(self.pool(), stamp_id)
            .await?
            .filter(|s| s.set_id == set_id)
            .ok_or(WorkflowError::stamp_not_found(stamp_id))
    }

    /// Move `set_id` along one edge of the status graph.
    async fn transition(
        &self,
        set_id: DbId,
        from: SetStatus,
        to: SetStatus,
        action: &str,
    ) -> Result<StampSet, WorkflowError> {
        from.ensure_transition(to, action)?;
        let set = StampSetRepo::transition(self.pool(), set_id, from, to)
            .await?
            .ok_or_else(|| {
                WorkflowError::Conflict(format!("Stamp set {set_id} is no longer {from}"))
            })?;
        if from != to {
            self.publish_status(set_id, from, to);
        }
        Ok(set)
    }

    fn publish_status(&self, set_id: DbId, from: SetStatus, to: SetStatus) {
        tracing::info!(set_id, from = %from, to = %to, "Stamp set status changed");
        self.inner
            .ctx
            .events
            .publish(PlatformEvent::status_changed(set_id, from.as_str(), to.as_str()));
    }

    fn spawn_proposals(&self, set_id: DbId, hint: Option<String>) -> Result<TaskHandle, WorkflowError> {
        let slot = self.inner.registry.try_claim(set_id)?;
        let engine = self.clone();
        Ok(self.spawn_stage(slot, Stage::Proposals, async move {
            engine.run_proposals(set_id, hint).await
        }))
    }

    /// Spawn a stage body under `slot` and report its failure, if any.
    fn spawn_stage<F>(&self, slot: TaskSlot, stage: Stage, body: F) -> TaskHandle
    where
        F: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        let set_id = slot.set_id();
        let engine = self.clone();
        self.inner.registry.spawn(slot, stage.as_str(), async move {
            if let Err(e) = body.await {
                engine.report_failure(set_id, stage, &e);
            }
        })
    }

    fn report_failure(&self, set_id: DbId, stage: Stage, error: &WorkflowError) {
        tracing::error!(set_id, stage = stage.as_str(), kind = error.kind(), error = %error, "Stage failed");
        self.inner.ctx.events.publish(PlatformEvent::stage_failed(
            set_id,
            stage.as_str(),
            error.kind(),
            &error.to_string(),
        ));
        self.notify(messages::stage_failed(
            set_id,
            stage.label(),
            &error.to_string(),
            stage.retry_action(),
        ));
    }

    async fn export_stamps(
        &self,
        set_id: DbId,
        stamps: &[Stamp],
    ) -> Result<ExportSummary, WorkflowError> {
        let summary =
            export::export_training_data(&self.inner.config.export_dir, set_id, stamps).await?;
        StampSetRepo::mark_exported(self.pool(), set_id).await?;
        self.inner.ctx.events.publish(
            PlatformEvent::new(EVENT_EXPORTED)
                .with_source(ENTITY_STAMP_SET, set_id)
                .with_payload(json!({
                    "exported": summary.exported,
                    "skipped": summary.skipped,
                    "directory": summary.directory.to_string_lossy(),
                })),
        );
        Ok(summary)
    }

    /// Render a composite preview into the set directory.
    async fn render_preview(
        &self,
        set_id: DbId,
        stamps: &[Stamp],
        columns: u32,
        file_name: &str,
    ) -> Result<PathBuf, WorkflowError> {
        let entries: Vec<GridEntry> = stamps
            .iter()
            .map(|s| GridEntry {
                number: s.number,
                image_path: s
                    .image_path
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
            })
            .collect();
        let out = self.set_dir(set_id).join(file_name);
        let target = out.clone();
        tokio::task::spawn_blocking(move || composite::render_grid(&entries, columns, &target))
            .await
            .map_err(join_error)??;
        tracing::debug!(set_id, path = %out.display(), tiles = stamps.len(), "Preview rendered");
        Ok(out)
    }
}

fn validate_name(name: &str) -> Result<&str, WorkflowError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WorkflowError::Validation(
            "Stamp set name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(WorkflowError::Validation(format!(
            "Stamp set name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

fn busy(set_id: DbId) -> WorkflowError {
    WorkflowError::Conflict(format!(
        "Stamp set {set_id} already has a task in progress"
    ))
}

fn join_error(e: JoinError) -> WorkflowError {
    WorkflowError::Io(std::io::Error::other(e))
}
