//! Handlers for the `/sets` resource.
//!
//! Read-only dashboard views over stamp sets, plus the two operations the
//! dashboard can start: training-data export and reference upload.

use std::path::Path as FsPath;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use stampline_core::naming;
use stampline_core::types::DbId;
use stampline_db::models::stamp::{Stamp, StampCounts};
use stampline_db::models::stamp_set::StampSet;
use stampline_db::repositories::stamp_set_repo::StampSetSummary;
use stampline_db::repositories::{SetFilter, StampRepo, StampSetRepo};
use stampline_pipeline::export::ExportSummary;
use stampline_pipeline::WorkflowError;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// A stamp with the download URL of its artifact.
#[derive(Debug, Serialize)]
pub struct StampItem {
    #[serde(flatten)]
    pub stamp: Stamp,
    pub image_url: Option<String>,
}

/// Full dashboard view of one set.
#[derive(Debug, Serialize)]
pub struct SetDetail {
    #[serde(flatten)]
    pub set: StampSet,
    pub counts: StampCounts,
    pub stamps: Vec<StampItem>,
    pub reference_url: Option<String>,
    pub sample_grid_url: Option<String>,
    pub grid_url: Option<String>,
}

/// Acknowledgement for an accepted background stage.
#[derive(Debug, Serialize)]
pub struct StageAccepted {
    pub set_id: DbId,
    pub stage: &'static str,
}

/// GET /api/v1/sets
///
/// Most recent sets first, optionally filtered by status and genre, each
/// with its stamp and generated counts.
pub async fn list_sets(
    State(state): State<AppState>,
    Query(filter): Query<SetFilter>,
) -> AppResult<Json<DataResponse<Vec<StampSetSummary>>>> {
    let sets = StampSetRepo::list(&state.pool, &filter).await?;
    Ok(Json(DataResponse { data: sets }))
}

/// GET /api/v1/sets/{id}
pub async fn get_set(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<SetDetail>>> {
    let set = StampSetRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| WorkflowError::set_not_found(id))?;
    let counts = StampRepo::counts(&state.pool, id).await?;
    let stamps = StampRepo::list_by_set(&state.pool, id).await?;

    let prefix = &state.engine.config().files_url_prefix;
    let set_dir = state
        .engine
        .config()
        .output_dir
        .join(naming::set_dir_name(id));

    let stamps = stamps
        .into_iter()
        .map(|stamp| StampItem {
            image_url: stamp
                .image_path
                .as_deref()
                .and_then(|p| artifact_url(prefix, id, p)),
            stamp,
        })
        .collect();

    let reference_url = set
        .reference_image_path
        .as_deref()
        .and_then(|p| artifact_url(prefix, id, p));
    let sample_grid_url = existing_url(prefix, id, &set_dir, naming::SAMPLE_GRID_FILE).await;
    let grid_url = existing_url(prefix, id, &set_dir, naming::FULL_GRID_FILE).await;

    Ok(Json(DataResponse {
        data: SetDetail {
            set,
            counts,
            stamps,
            reference_url,
            sample_grid_url,
            grid_url,
        },
    }))
}

/// POST /api/v1/sets/{id}/export
///
/// Write the training-data export for a set's generated stamps.
pub async fn export_set(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ExportSummary>>> {
    let summary = state.engine.export_training_data(id).await?;
    Ok(Json(DataResponse { data: summary }))
}

/// POST /api/v1/sets/{id}/reference
///
/// Store the request body as the set's reference image and start the
/// proposal stage. Returns 202 once the stage is scheduled.
pub async fn upload_reference(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<DataResponse<StageAccepted>>)> {
    let handle = state.engine.attach_reference(id, body.to_vec()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: StageAccepted {
                set_id: handle.set_id(),
                stage: handle.stage(),
            },
        }),
    ))
}

// ── Private helpers ──────────────────────────────────────────────────────

/// Download URL for an artifact stored at `path`.
fn artifact_url(prefix: &str, set_id: DbId, path: &str) -> Option<String> {
    let name = FsPath::new(path).file_name()?.to_str()?;
    naming::is_safe_file_name(name).then(|| format!("{prefix}/{set_id}/{name}"))
}

/// Download URL for `file` in the set directory, if it has been written.
async fn existing_url(prefix: &str, set_id: DbId, set_dir: &FsPath, file: &str) -> Option<String> {
    match tokio::fs::try_exists(set_dir.join(file)).await {
        Ok(true) => Some(format!("{prefix}/{set_id}/{file}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_url_uses_the_file_name_only() {
        assert_eq!(
            artifact_url("/api/v1/files", 3, "/srv/output/3/stamp_07.png").as_deref(),
            Some("/api/v1/files/3/stamp_07.png")
        );
        assert_eq!(artifact_url("/api/v1/files", 3, ""), None);
        assert_eq!(artifact_url("/api/v1/files", 3, "/srv/output/3/.hidden"), None);
    }
}
