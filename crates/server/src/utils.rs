use std::path::PathBuf;

use axum::http::StatusCode;
use axum::Json;
use library::IndexerError;
use tracing::warn;

use crate::state::{AppState, ErrorResponse};

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Request `dir`, else the configured library root.
pub fn resolve_dir(
    state: &AppState,
    dir: Option<&str>,
) -> Result<PathBuf, (StatusCode, Json<ErrorResponse>)> {
    match dir.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Ok(PathBuf::from(value)),
        None => state
            .library_root
            .clone()
            .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "dir is required")),
    }
}

pub fn indexer_error(err: IndexerError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        IndexerError::DirectoryNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "Directory not found")
        }
        IndexerError::Io(err) => {
            warn!("Scan failed: {}", err);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
