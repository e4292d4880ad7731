pub mod files;
pub mod library;

use axum::{routing::get, Json, Router};

use crate::state::{AppState, HealthResponse};

pub fn api_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/playlists", get(library::list_playlists))
        .route("/playlist/:playlist_id", get(library::get_playlist))
        .route("/videos", get(library::list_videos))
        .route("/search", get(library::search))
        .route("/file", get(files::serve_file));

    Router::new()
        .route("/health", get(health))
        .nest("/api", routes)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
