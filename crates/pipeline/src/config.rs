//! Engine configuration loaded from environment variables.

use std::path::PathBuf;

use stampline_core::training::DEFAULT_INTERPRETER;

/// Directories and limits used by the workflow engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the per-set artifact directories (`OUTPUT_DIR`).
    pub output_dir: PathBuf,
    /// Root of the training-data export (`LORA_EXPORT_DIR`).
    pub export_dir: PathBuf,
    /// Root of trained model output (`LORA_MODELS_DIR`).
    pub models_dir: PathBuf,
    /// Upper bound on background tasks running at once (`MAX_CONCURRENT_TASKS`).
    pub max_concurrent_tasks: usize,
    /// Training script (`KOHYA_PATH`).
    pub training_script: PathBuf,
    /// Base model handed to training (`BASE_MODEL_PATH`).
    pub base_model_path: PathBuf,
    /// Interpreter that runs the training script (`TRAINING_INTERPRETER`).
    pub training_interpreter: String,
    /// Path prefix under which the dashboard serves set files.
    pub files_url_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            export_dir: PathBuf::from("./lora_export"),
            models_dir: PathBuf::from("./data/lora_models"),
            max_concurrent_tasks: 4,
            training_script: PathBuf::from("train_network.py"),
            base_model_path: PathBuf::from("models/base_model"),
            training_interpreter: DEFAULT_INTERPRETER.to_string(),
            files_url_prefix: "/api/v1/files".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from environment variables, falling back to [`Default`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let path = |key: &str, fallback: PathBuf| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(fallback)
        };

        Self {
            output_dir: path("OUTPUT_DIR", defaults.output_dir),
            export_dir: path("LORA_EXPORT_DIR", defaults.export_dir),
            models_dir: path("LORA_MODELS_DIR", defaults.models_dir),
            max_concurrent_tasks: std::env::var("MAX_CONCURRENT_TASKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_tasks),
            training_script: path("KOHYA_PATH", defaults.training_script),
            base_model_path: path("BASE_MODEL_PATH", defaults.base_model_path),
            training_interpreter: std::env::var("TRAINING_INTERPRETER")
                .unwrap_or(defaults.training_interpreter),
            files_url_prefix: defaults.files_url_prefix,
        }
    }

    /// Everything rooted in one directory; used by tests.
    pub fn rooted_at(root: &std::path::Path) -> Self {
        Self {
            output_dir: root.join("output"),
            export_dir: root.join("lora_export"),
            models_dir: root.join("lora_models"),
            ..Self::default()
        }
    }
}
