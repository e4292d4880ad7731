use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Query, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::warn;

use crate::state::FileQuery;
use crate::utils::json_error;

/// Streams a library file; range requests are handled by `ServeFile`.
pub async fn serve_file(Query(query): Query<FileQuery>, request: Request) -> Response {
    let path = match query.path.as_deref().filter(|value| !value.is_empty()) {
        Some(value) => PathBuf::from(value),
        None => return json_error(StatusCode::BAD_REQUEST, "path is required").into_response(),
    };

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => {
            if response.status() == StatusCode::NOT_FOUND {
                warn!("File not found: {}", path.display());
            }
            response.map(Body::new)
        }
        Err(never) => match never {},
    }
}
