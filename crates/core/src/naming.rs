//! File naming for the per-set artifact layout.
//!
//! ```text
//! {OUTPUT_DIR}/{set_id}/stamp_01.png ... stamp_NN.png
//! {OUTPUT_DIR}/{set_id}/sample_grid.png
//! {OUTPUT_DIR}/{set_id}/grid.png
//! {OUTPUT_DIR}/{set_id}/reference.png
//! {LORA_EXPORT_DIR}/{set_id}/001.png + 001.txt ...
//! {LORA_MODELS_DIR}/{set_id}/set_{set_id}.safetensors
//! ```

use crate::types::DbId;

/// Composite preview of the sample batch.
pub const SAMPLE_GRID_FILE: &str = "sample_grid.png";

/// Composite preview of the full batch.
pub const FULL_GRID_FILE: &str = "grid.png";

/// Uploaded reference image.
pub const REFERENCE_FILE: &str = "reference.png";

/// Weight applied to a set's derived model when injected into a prompt.
pub const DERIVED_MODEL_WEIGHT: f32 = 0.8;

/// Maximum accepted length of a downloadable file name.
const MAX_FILE_NAME_LEN: usize = 128;

/// Directory name for a set under any of the artifact roots.
pub fn set_dir_name(set_id: DbId) -> String {
    set_id.to_string()
}

/// Artifact file for the stamp at `ordinal`.
pub fn stamp_file_name(ordinal: i64) -> String {
    format!("stamp_{ordinal:02}.png")
}

/// Image file name in the training-data export.
pub fn export_image_name(ordinal: i64) -> String {
    format!("{ordinal:03}.png")
}

/// Caption file name in the training-data export.
pub fn export_caption_name(ordinal: i64) -> String {
    format!("{ordinal:03}.txt")
}

/// Output name passed to the training binary, and the model file it writes.
pub fn model_output_name(set_id: DbId) -> String {
    format!("set_{set_id}")
}

/// File the training binary is expected to produce.
pub fn model_file_name(set_id: DbId) -> String {
    format!("{}.safetensors", model_output_name(set_id))
}

/// Prompt fragment that activates a set's derived model.
pub fn derived_model_tag(set_id: DbId) -> String {
    format!("<lora:{}:{DERIVED_MODEL_WEIGHT}>", model_output_name(set_id))
}

/// Whether `name` is a plain file name that can be served for download.
///
/// Rejects empty names, path separators, parent references and hidden
/// files so a request can never escape the set directory.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FILE_NAME_LEN
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
