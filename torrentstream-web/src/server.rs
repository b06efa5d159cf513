//! HTTP server for torrentstream
//!
//! Maps magnet links to playback runs, redirects clients to the served file
//! once a run is streaming, and serves the download root statically.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::sync::RwLock;
use torrentstream_core::config::StreamConfig;
use torrentstream_core::engine::{InfoHash, SimulatedEngine, SwarmProfile};
use torrentstream_core::{PlaybackOrchestrator, PlayerLauncher, StreamController, StreamState};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::handlers::{cancel_stream, list_streams, start_stream};
use crate::publisher::HttpPublisher;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PlaybackOrchestrator>,
    pub streams: Arc<RwLock<HashMap<InfoHash, StreamController>>>,
    pub publisher: HttpPublisher,
    /// Route prefix of the static file service
    pub streams_prefix: String,
    /// Every run downloads into `<download_root>/<info hash>`
    pub download_root: PathBuf,
    pub ignore_patterns: Vec<String>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<PlaybackOrchestrator>,
        config: &StreamConfig,
        download_root: PathBuf,
    ) -> Self {
        let publisher = HttpPublisher::new(
            config.server.base_url(),
            config.server.streams_prefix.clone(),
        );

        Self {
            ignore_patterns: orchestrator.playback().ignore_patterns.clone(),
            orchestrator,
            streams: Arc::new(RwLock::new(HashMap::new())),
            publisher,
            streams_prefix: config.server.streams_prefix.clone(),
            download_root,
        }
    }

    /// Opens every published stream in `player` as well.
    pub fn with_player(mut self, player: PlayerLauncher) -> Self {
        self.publisher = self.publisher.with_player(player);
        self
    }

    pub fn save_path(&self, info_hash: InfoHash) -> PathBuf {
        self.download_root.join(info_hash.to_string())
    }

    /// Releases a run that ended `FAILED` or `CANCELLED` and forgets it.
    ///
    /// The entry is kept when the engine refuses the removal, so a later
    /// request retries it. A newer run under the same info hash is left alone.
    pub async fn retire(&self, controller: &StreamController) {
        let info_hash = controller.info_hash();
        if let Err(e) = controller.release().await {
            tracing::warn!("Failed to release stream {}: {}", info_hash, e);
            return;
        }

        let mut streams = self.streams.write().await;
        if streams
            .get(&info_hash)
            .is_some_and(|current| current.is_same_run(controller))
        {
            streams.remove(&info_hash);
            tracing::debug!("Forgot stream {} ({})", info_hash, controller.state());
        }
    }

    /// Retires `controller` in the background once its run fails or is
    /// cancelled. Finished runs stay listed; their handle is already gone.
    pub(crate) fn watch_run(&self, controller: StreamController) {
        let state = self.clone();
        tokio::spawn(async move {
            let outcome = controller.wait_terminal().await;
            if matches!(outcome, StreamState::Failed(_) | StreamState::Cancelled) {
                state.retire(&controller).await;
            }
        });
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    let files = ServeDir::new(&state.download_root);

    Router::new()
        .route("/stream", get(start_stream).delete(cancel_stream))
        .route("/api/streams", get(list_streams))
        .nest_service(&state.streams_prefix, files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the HTTP surface on the configured address until the process stops.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - Invalid configuration or the address could not be bound
pub async fn run_server(
    config: StreamConfig,
    download_root: PathBuf,
    open_in_player: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    tokio::fs::create_dir_all(&download_root).await?;

    let engine = Arc::new(SimulatedEngine::new(
        config.engine.clone(),
        SwarmProfile::from(&config.simulation),
    ));
    let orchestrator = Arc::new(PlaybackOrchestrator::new(engine, config.playback.clone())?);

    let mut state = AppState::new(orchestrator, &config, download_root.clone());
    if open_in_player {
        state = state.with_player(PlayerLauncher::from_config(&config.player));
    }

    let app = build_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        "torrentstream serving {} on {}",
        download_root.display(),
        config.server.base_url()
    );
    axum::serve(listener, app).await?;
    Ok(())
}
