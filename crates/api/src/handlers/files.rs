//! Handlers for the `/files` resource: downloads from a set directory.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use stampline_core::naming;
use stampline_core::types::DbId;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /api/v1/files/{set_id}/{filename}
///
/// Serve one artifact from `{OUTPUT_DIR}/{set_id}/`. File names containing
/// separators or parent references are rejected before touching the disk.
pub async fn download(
    State(state): State<AppState>,
    Path((set_id, filename)): Path<(DbId, String)>,
) -> AppResult<impl IntoResponse> {
    if !naming::is_safe_file_name(&filename) {
        return Err(AppError::BadRequest(format!("Invalid file name: {filename}")));
    }

    let path = state
        .engine
        .config()
        .output_dir
        .join(naming::set_dir_name(set_id))
        .join(&filename);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!(
                "File {filename} not found for set {set_id}"
            )));
        }
        Err(e) => {
            tracing::error!(set_id, file = %filename, error = %e, "Failed to read artifact");
            return Err(AppError::InternalError(e.to_string()));
        }
    };

    Ok(([(CONTENT_TYPE, content_type(&filename))], bytes))
}

fn content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
