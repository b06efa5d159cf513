//! Stream lifecycle endpoints

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use torrentstream_core::{
    LargestMedia, MagnetLink, StreamController, StreamError, StreamRequest, StreamState,
};

use super::ApiError;
use crate::publisher::stream_path;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub magnet: String,
}

/// One row of `GET /api/streams`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamSummary {
    pub info_hash: String,
    pub state: String,
    pub file: Option<String>,
    pub file_percent: Option<f64>,
    pub download_rate: Option<u64>,
    pub peers: Option<u32>,
}

impl StreamSummary {
    fn from_controller(controller: &StreamController) -> Self {
        let progress = controller.progress();
        Self {
            info_hash: controller.info_hash().to_string(),
            state: controller.state().to_string(),
            file: controller
                .selected_file()
                .map(|file| file.path().to_string()),
            file_percent: progress.as_ref().and_then(|p| p.file_percent),
            download_rate: progress.as_ref().map(|p| p.status.download_rate),
            peers: progress.as_ref().map(|p| p.status.num_peers),
        }
    }
}

/// `GET /stream?magnet=...`
///
/// Starts (or joins) the run for the magnet link, waits until it streams and
/// redirects to the served file.
pub async fn start_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let magnet = MagnetLink::parse(&query.magnet).map_err(ApiError::InvalidMagnet)?;
    let info_hash = magnet.info_hash();
    let controller = stream_for(&state, magnet).await?;

    let reached = controller
        .wait_for(|current| current.is_streaming() || current.is_terminal())
        .await;

    match reached {
        StreamState::Failed(reason) => {
            state.retire(&controller).await;
            Err(ApiError::StreamFailed { info_hash, reason })
        }
        StreamState::Cancelled => {
            state.retire(&controller).await;
            Err(ApiError::Cancelled { info_hash })
        }
        _ => {
            let file = controller.selected_file().ok_or(ApiError::NotFound)?;
            let location = stream_path(&state.streams_prefix, info_hash, &file);
            tracing::info!("Redirecting {} to {}", info_hash, location);
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
    }
}

/// Returns the live run for `magnet`, starting one when there is none.
///
/// Failed or cancelled runs are released and replaced.
async fn stream_for(state: &AppState, magnet: MagnetLink) -> Result<StreamController, ApiError> {
    let info_hash = magnet.info_hash();
    let mut streams = state.streams.write().await;

    if let Some(existing) = streams.get(&info_hash) {
        match existing.state() {
            // Left behind by a removal the engine refused earlier.
            StreamState::Failed(_) | StreamState::Cancelled => {
                existing.release().await.map_err(StreamError::Engine)?;
                streams.remove(&info_hash);
            }
            _ => return Ok(existing.clone()),
        }
    }

    let request = StreamRequest::new(
        magnet,
        LargestMedia::new(state.ignore_patterns.clone()),
        state.publisher.clone(),
    )
    .with_save_path(state.save_path(info_hash));

    let controller = state.orchestrator.start(request).await?.detach();
    streams.insert(info_hash, controller.clone());
    state.watch_run(controller.clone());
    Ok(controller)
}

/// `DELETE /stream?magnet=...`
pub async fn cancel_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<&'static str, ApiError> {
    let magnet = MagnetLink::parse(&query.magnet).map_err(ApiError::InvalidMagnet)?;

    let controller = state
        .streams
        .write()
        .await
        .remove(&magnet.info_hash())
        .ok_or(ApiError::NotFound)?;

    let final_state = controller.cancel().await?;
    tracing::info!("Stream {} ended as {}", controller.info_hash(), final_state);
    Ok("OK")
}

/// `GET /api/streams`
pub async fn list_streams(State(state): State<AppState>) -> Json<Vec<StreamSummary>> {
    let streams = state.streams.read().await;
    let mut summaries: Vec<StreamSummary> =
        streams.values().map(StreamSummary::from_controller).collect();
    summaries.sort_by(|a, b| a.info_hash.cmp(&b.info_hash));
    Json(summaries)
}
