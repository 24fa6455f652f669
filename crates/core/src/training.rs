//! Derived-model training subprocess.
//!
//! Training is delegated to an external script run through an
//! interpreter. The run counts as successful only when the process exits
//! with status zero *and* the expected model file exists afterwards.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::naming;
use crate::types::DbId;

/// Interpreter used to run the training script.
pub const DEFAULT_INTERPRETER: &str = "python";

/// Bytes of stderr kept for the failure message.
const STDERR_TAIL_BYTES: usize = 2048;

/// Cap on captured output per stream (4 MiB).
const MAX_OUTPUT_BYTES: u64 = 4 * 1024 * 1024;

/// Errors from a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Failed to start training process: {0}")]
    Spawn(std::io::Error),

    #[error("Training exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Training finished but produced no model at {0}")]
    MissingOutput(PathBuf),

    #[error("Training I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully-specified training invocation.
#[derive(Debug, Clone)]
pub struct TrainingCommand {
    pub interpreter: String,
    pub script: PathBuf,
    pub base_model: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_name: String,
}

impl TrainingCommand {
    /// Invocation for one set. `models_root` is the models directory; the
    /// set gets its own subdirectory beneath it.
    pub fn for_set(
        set_id: DbId,
        script: impl Into<PathBuf>,
        base_model: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        models_root: &Path,
    ) -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            script: script.into(),
            base_model: base_model.into(),
            data_dir: data_dir.into(),
            output_dir: models_root.join(naming::set_dir_name(set_id)),
            output_name: naming::model_output_name(set_id),
        }
    }

    /// Replace the interpreter (tests point this at a shell).
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Path the script is expected to write.
    pub fn expected_output(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.safetensors", self.output_name))
    }

    /// Script arguments: the four variable paths followed by the fixed
    /// hyper-parameter set.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.script.display().to_string(),
            "--pretrained_model_name_or_path".into(),
            self.base_model.display().to_string(),
            "--train_data_dir".into(),
            self.data_dir.display().to_string(),
            "--output_dir".into(),
            self.output_dir.display().to_string(),
            "--output_name".into(),
            self.output_name.clone(),
        ];
        args.extend(
            [
                "--network_dim",
                "32",
                "--max_train_epochs",
                "10",
                "--save_model_as",
                "safetensors",
                "--save_every_n_epochs",
                "5",
                "--mixed_precision",
                "fp16",
                "--cache_latents",
                "--use_8bit_adam",
                "--xformers",
                "--gradient_checkpointing",
                "--gradient_accumulation_steps",
                "1",
            ]
            .into_iter()
            .map(String::from),
        );
        args
    }

    /// Run the training process to completion and return the model path.
    pub async fn run(&self) -> Result<TrainingOutcome, TrainingError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let start = Instant::now();
        let mut child = Command::new(&self.interpreter)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TrainingError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_stream(stdout).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr).await });

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(TrainingError::Failed {
                code: status.code().unwrap_or(-1),
                stderr: tail(&stderr_bytes),
            });
        }

        let model_path = self.expected_output();
        if !tokio::fs::try_exists(&model_path).await.unwrap_or(false) {
            return Err(TrainingError::MissingOutput(model_path));
        }

        Ok(TrainingOutcome {
            model_path,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Result of a successful training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub model_path: PathBuf,
    pub duration_ms: u64,
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
