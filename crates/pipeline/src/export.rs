//! Training-data export.
//!
//! Writes `NNN.png` plus an `NNN.txt` caption for every generated stamp
//! into `{export_root}/{set_id}/`. The caption is the stamp's authored
//! prompt, or its phrase when no prompt was authored.

use std::path::{Path, PathBuf};

use serde::Serialize;
use stampline_core::naming;
use stampline_core::types::DbId;
use stampline_db::models::stamp::Stamp;

/// What one export run wrote.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExportSummary {
    pub set_id: DbId,
    pub directory: PathBuf,
    pub exported: usize,
    pub skipped: usize,
}

/// Export every stamp that has an artifact on disk.
pub async fn export_training_data(
    export_root: &Path,
    set_id: DbId,
    stamps: &[Stamp],
) -> Result<ExportSummary, std::io::Error> {
    let directory = export_root.join(naming::set_dir_name(set_id));
    tokio::fs::create_dir_all(&directory).await?;

    let mut exported = 0;
    let mut skipped = 0;
    for stamp in stamps {
        let Some(source) = stamp.image_path.as_deref().filter(|p| !p.is_empty()) else {
            skipped += 1;
            continue;
        };
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            tracing::warn!(set_id, stamp_id = stamp.id, path = source, "Artifact missing, not exported");
            skipped += 1;
            continue;
        }

        tokio::fs::copy(source, directory.join(naming::export_image_name(stamp.number))).await?;
        let caption = if stamp.prompt.trim().is_empty() {
            &stamp.phrase
        } else {
            &stamp.prompt
        };
        tokio::fs::write(directory.join(naming::export_caption_name(stamp.number)), caption)
            .await?;
        exported += 1;
    }

    tracing::info!(set_id, exported, skipped, dir = %directory.display(), "Training data exported");
    Ok(ExportSummary {
        set_id,
        directory,
        exported,
        skipped,
    })
}
