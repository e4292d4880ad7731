use std::path::PathBuf;

use axum::http::StatusCode;
use axum::Json;
use library::Indexer;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct AppState {
    pub indexer: Indexer,
    /// Fallback for requests that omit `dir`.
    pub library_root: Option<PathBuf>,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct DirQuery {
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub dir: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: Option<String>,
}
