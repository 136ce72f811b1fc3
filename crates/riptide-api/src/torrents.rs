//! Torrent route handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose};
use tracing::{info, warn};
use url::Url;

use riptide_api_models::{
    AddTorrentRequest, AddTorrentResponse, BatchOutcome, BatchRequest, TorrentDetail,
    TorrentListResponse, TorrentStatsView, TorrentSummary,
};
use riptide_core::lifecycle::{AddTorrent, AddTorrentOptions, BatchOp};
use riptide_core::model::TorrentSpec;
use riptide_core::registry::TorrentEntry;
use riptide_events::TorrentId;

use crate::errors::ApiError;
use crate::state::ApiState;

pub(crate) async fn list_torrents(
    State(state): State<Arc<ApiState>>,
) -> Json<TorrentListResponse> {
    let torrents = state
        .handles
        .registry
        .list()
        .iter()
        .map(|entry| TorrentSummary::from(entry.as_ref()))
        .collect();
    Json(TorrentListResponse { torrents })
}

pub(crate) async fn add_torrent(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AddTorrentRequest>,
) -> Result<(StatusCode, Json<AddTorrentResponse>), ApiError> {
    if request.source_count() != 1 {
        return Err(ApiError::bad_request(
            "exactly one of magnet, metainfo_base64, or info_hash must be supplied",
        ));
    }

    let spec = if let Some(magnet) = request.magnet {
        TorrentSpec::magnet(magnet)
    } else if let Some(encoded) = request.metainfo_base64 {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| ApiError::bad_request("metainfo_base64 is not valid base64"))?;
        TorrentSpec::metainfo(bytes)
    } else if let Some(hash) = request.info_hash {
        TorrentSpec::info_hash(hash)
    } else {
        unreachable!("source_count() == 1 guarantees one source");
    };

    let id = state
        .handles
        .controller
        .add(AddTorrent {
            spec,
            options: AddTorrentOptions {
                name_hint: request.name,
                output_dir: request.output_dir.map(PathBuf::from),
                start_paused: request.start_paused,
            },
        })
        .await
        .map_err(|error| state.control_error(&error))?;

    info!(torrent_id = %id, "torrent admission accepted");
    update_active_gauge(&state);
    Ok((StatusCode::CREATED, Json(AddTorrentResponse { id })))
}

pub(crate) async fn get_torrent(
    State(state): State<Arc<ApiState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<Json<TorrentDetail>, ApiError> {
    let entry = lookup(&state, id)?;
    Ok(Json(TorrentDetail::from(entry.as_ref())))
}

pub(crate) async fn get_torrent_stats(
    State(state): State<Arc<ApiState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<Json<TorrentStatsView>, ApiError> {
    let entry = lookup(&state, id)?;
    let snapshot = state.handles.stats.snapshot_for(&entry);
    Ok(Json(TorrentStatsView::from(&snapshot)))
}

pub(crate) async fn start_torrent(
    State(state): State<Arc<ApiState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<StatusCode, ApiError> {
    let id = TorrentId::new(id);
    state
        .handles
        .controller
        .start(id)
        .await
        .map_err(|error| state.control_error(&error))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn pause_torrent(
    State(state): State<Arc<ApiState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<StatusCode, ApiError> {
    let id = TorrentId::new(id);
    state
        .handles
        .controller
        .pause(id)
        .await
        .map_err(|error| state.control_error(&error))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn delete_torrent(
    State(state): State<Arc<ApiState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<StatusCode, ApiError> {
    remove_torrent(&state, TorrentId::new(id), true).await
}

pub(crate) async fn forget_torrent(
    State(state): State<Arc<ApiState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<StatusCode, ApiError> {
    remove_torrent(&state, TorrentId::new(id), false).await
}

async fn remove_torrent(
    state: &ApiState,
    id: TorrentId,
    delete_data: bool,
) -> Result<StatusCode, ApiError> {
    let result = if delete_data {
        state.handles.controller.delete(id).await
    } else {
        state.handles.controller.forget(id).await
    };
    result.map_err(|error| state.control_error(&error))?;
    update_active_gauge(state);
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn batch_torrents(
    State(state): State<Arc<ApiState>>,
    AxumPath(op): AxumPath<String>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let op = match op.as_str() {
        "start" => BatchOp::Start,
        "pause" => BatchOp::Pause,
        "delete" => BatchOp::Delete,
        "forget" => BatchOp::Forget,
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown batch operation {other:?}"
            )));
        }
    };
    if request.ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty"));
    }

    let outcome = state.handles.controller.apply_batch(op, &request.ids).await;
    info!(
        op = op.as_str(),
        applied = outcome.applied.len(),
        failed = outcome.failed.len(),
        "batch operation applied"
    );
    update_active_gauge(&state);
    Ok(Json(outcome))
}

/// Ordered playlist of playable file URIs, rendered as an M3U document.
pub(crate) async fn get_playlist(
    State(state): State<Arc<ApiState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<Response, ApiError> {
    let entry = lookup(&state, id)?;
    let meta = entry.meta();

    let mut lines = vec!["#EXTM3U".to_string()];
    for file in meta.files.as_deref().unwrap_or_default() {
        if !is_playable(&state.playlist_extensions, &file.path) {
            continue;
        }
        let located = std::path::absolute(meta.output_dir.join(&file.path))
            .ok()
            .and_then(|path| Url::from_file_path(path).ok());
        match located {
            Some(url) => lines.push(url.to_string()),
            None => warn!(
                torrent_id = %entry.id,
                path = %file.path,
                "skipping unresolvable playlist entry"
            ),
        }
    }

    let mut body = lines.join("\n");
    body.push('\n');
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "audio/x-mpegurl")
        .body(Body::from(body))
        .map_err(|err| ApiError::internal(format!("failed to build playlist response: {err}")))
}

fn lookup(state: &ApiState, id: u64) -> Result<Arc<TorrentEntry>, ApiError> {
    let id = TorrentId::new(id);
    state.handles.registry.get(id).ok_or_else(|| {
        state.metrics.inc_api_error("not_found");
        ApiError::not_found(format!("torrent {id} is not tracked"))
    })
}

fn is_playable(extensions: &[String], path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|known| *known == ext)
        })
}

fn update_active_gauge(state: &ApiState) {
    let count = i64::try_from(state.handles.registry.len()).unwrap_or(i64::MAX);
    state.metrics.set_active_torrents(count);
}
