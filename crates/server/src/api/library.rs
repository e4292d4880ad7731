use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    Json,
};
use common::{Playlist, PlaylistVideos, VideoItem};
use tracing::debug;

use crate::state::{AppState, DirQuery, JsonResult, SearchQuery};
use crate::utils::{indexer_error, json_error, resolve_dir};

pub async fn list_playlists(
    State(state): State<AppState>,
    Query(query): Query<DirQuery>,
) -> JsonResult<Vec<Playlist>> {
    let dir = resolve_dir(&state, query.dir.as_deref())?;
    let playlists = state
        .indexer
        .scan_playlists(&dir)
        .await
        .map_err(indexer_error)?;
    Ok(Json(playlists))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    Query(query): Query<DirQuery>,
) -> JsonResult<PlaylistVideos> {
    let dir = resolve_dir(&state, query.dir.as_deref())?;
    match state
        .indexer
        .scan_playlist_videos(&dir, &playlist_id)
        .await
        .map_err(indexer_error)?
    {
        Some(playlist) => Ok(Json(playlist)),
        None => Err(json_error(StatusCode::NOT_FOUND, "Playlist not found")),
    }
}

pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<DirQuery>,
) -> JsonResult<Vec<VideoItem>> {
    let dir = resolve_dir(&state, query.dir.as_deref())?;
    let videos = state
        .indexer
        .scan_all_videos(&dir)
        .await
        .map_err(indexer_error)?;
    Ok(Json(videos))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> JsonResult<Vec<VideoItem>> {
    let dir = resolve_dir(&state, query.dir.as_deref())?;
    let text = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "query is required"))?;
    let results = state
        .indexer
        .search(&dir, text)
        .await
        .map_err(indexer_error)?;
    debug!("Search {:?} matched {} videos", text, results.len());
    Ok(Json(results))
}
