//! Playback state machine driver

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::active::{ActiveStream, SaveDir, StreamController, StreamResources};
use super::monitor::{StreamProgress, run_monitor};
use super::{StreamError, StreamOutcome, StreamRequest, StreamState};
use crate::catalog::{FileCatalog, FileEntry};
use crate::config::PlaybackConfig;
use crate::engine::{AddTorrentParams, TorrentEngine, TorrentHandle};
use crate::selector::{self, FileSelector};
use crate::stream::{StreamContext, StreamFunction};
use crate::{TorrentStreamError, scheduler};

/// Starts playback runs against a borrowed engine session.
///
/// The orchestrator never owns the session's lifecycle; it only adds and
/// removes the torrents of its own runs.
pub struct PlaybackOrchestrator {
    engine: Arc<dyn TorrentEngine>,
    playback: PlaybackConfig,
}

impl PlaybackOrchestrator {
    /// # Errors
    /// - `TorrentStreamError::Configuration` - Playback budgets are unusable
    pub fn new(
        engine: Arc<dyn TorrentEngine>,
        playback: PlaybackConfig,
    ) -> Result<Self, TorrentStreamError> {
        playback.validate()?;
        Ok(Self { engine, playback })
    }

    pub fn engine(&self) -> &Arc<dyn TorrentEngine> {
        &self.engine
    }

    pub fn playback(&self) -> &PlaybackConfig {
        &self.playback
    }

    /// Ingests the request's magnet link and starts its run in the background.
    ///
    /// Returns once the handle exists; the run itself is observed through
    /// the returned [`ActiveStream`].
    ///
    /// # Errors
    /// - `StreamError::Io` - Temporary save directory could not be created
    /// - `StreamError::Engine` - Engine rejected the magnet link
    pub async fn start(&self, request: StreamRequest) -> Result<ActiveStream, StreamError> {
        let settings = self.engine.settings();
        let magnet = request.magnet.with_trackers(&settings.trackers);
        let info_hash = magnet.info_hash();

        let save_dir = match &request.save_path {
            Some(path) => SaveDir::Provided(path.clone()),
            None => SaveDir::temporary(settings.download_root.as_deref())?,
        };
        let save_path = save_dir.path().to_path_buf();

        let mut params = AddTorrentParams::new(save_path.clone());
        params.storage_mode = request.storage_mode.unwrap_or(settings.storage_mode);
        let handle = self.engine.add_torrent(&magnet, params).await?;

        tracing::info!(
            "Started stream {} ({}) in {}",
            info_hash,
            magnet.display_name().unwrap_or("unnamed"),
            save_path.display()
        );

        let (state_tx, state_rx) = watch::channel(StreamState::Init);
        let (progress_tx, progress_rx) = watch::channel(None);
        let (selected_tx, selected_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let run_token = cancel.child_token();
        let resources = Arc::new(StreamResources::new(
            self.engine.clone(),
            info_hash,
            request.remove_after,
            save_dir,
        ));

        let controller = StreamController::new(
            info_hash,
            state_rx,
            progress_rx,
            selected_rx,
            cancel.clone(),
            resources.clone(),
        );

        let run = StreamRun {
            catalog: FileCatalog::new(handle.clone()),
            handle,
            playback: self.playback.clone(),
            selector: request.selector,
            stream_fn: request.stream_fn,
            context: StreamContext {
                info_hash,
                save_path,
                cancel: run_token.clone(),
            },
            state: state_tx,
            selected: selected_tx,
            cancel,
            run_token,
            resources,
            started: Instant::now(),
        };
        let task = tokio::spawn(run.execute(progress_tx));

        Ok(ActiveStream::new(controller, task))
    }
}

enum MetadataWait {
    Ready,
    AlreadyFinished,
}

/// State owned by the task driving one run.
struct StreamRun {
    handle: Arc<dyn TorrentHandle>,
    catalog: FileCatalog,
    playback: PlaybackConfig,
    selector: Arc<dyn FileSelector>,
    stream_fn: Arc<dyn StreamFunction>,
    context: StreamContext,
    state: watch::Sender<StreamState>,
    selected: watch::Sender<Option<FileEntry>>,
    /// External cancellation
    cancel: CancellationToken,
    /// Cancelled when the run ends for any reason
    run_token: CancellationToken,
    resources: Arc<StreamResources>,
    started: Instant,
}

impl StreamRun {
    async fn execute(
        self,
        progress: watch::Sender<Option<StreamProgress>>,
    ) -> Result<StreamOutcome, StreamError> {
        let monitor = tokio::spawn(run_monitor(
            self.handle.clone(),
            self.selected.subscribe(),
            progress,
            self.playback.monitor_interval,
            self.run_token.clone(),
        ));

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamError::Cancelled),
            result = self.drive() => result,
        };

        self.run_token.cancel();
        if let Err(e) = monitor.await {
            tracing::warn!("Monitor for {} ended abnormally: {}", self.context.info_hash, e);
        }

        // Released before the terminal state is published so that observers
        // of DONE or CANCELLED see the handle gone.
        match &result {
            Ok(outcome) => {
                self.release().await;
                tracing::info!(
                    "Stream {} done after {:.1}s ({})",
                    self.context.info_hash,
                    outcome.elapsed.as_secs_f64(),
                    outcome.file.path()
                );
                self.transition(StreamState::Done);
            }
            Err(StreamError::Cancelled) => {
                self.release().await;
                self.transition(StreamState::Cancelled);
            }
            Err(error) => {
                tracing::error!("Stream {} failed: {}", self.context.info_hash, error);
                let reason = error
                    .failure_reason()
                    .unwrap_or(super::FailureReason::Aborted);
                self.transition(StreamState::Failed(reason));
            }
        }

        result
    }

    async fn drive(&self) -> Result<StreamOutcome, StreamError> {
        let fast_path = if self.handle.is_finished().await? {
            tracing::info!(
                "{} already complete, skipping prioritization",
                self.context.info_hash
            );
            true
        } else {
            self.transition(StreamState::AwaitingMetadata);
            matches!(self.await_metadata().await?, MetadataWait::AlreadyFinished)
        };

        let files = self.catalog.files().await?;
        let file = selector::select(&files, self.selector.as_ref())?;
        tracing::info!(
            "Selected {} ({} bytes) out of {} files",
            file.path(),
            file.size(),
            files.len()
        );
        self.selected.send_replace(Some(file.clone()));
        self.transition(StreamState::FileSelected);

        if fast_path {
            self.transition(StreamState::Streaming);
            self.stream_fn.stream(&self.context, &file).await?;
            return Ok(self.outcome(file, true));
        }

        scheduler::apply_exclusive(self.handle.as_ref(), &files, &file).await?;
        self.transition(StreamState::Prioritized);

        self.transition(StreamState::CacheFilling);
        self.await_cache_fill(&file).await?;

        self.transition(StreamState::Streaming);
        tokio::try_join!(
            self.await_download(),
            self.stream_fn.stream(&self.context, &file)
        )?;

        Ok(self.outcome(file, false))
    }

    async fn await_metadata(&self) -> Result<MetadataWait, StreamError> {
        let budget = self.playback.metadata_timeout;
        match tokio::time::timeout(budget, self.poll_metadata()).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::MetadataTimeout { timeout: budget }),
        }
    }

    async fn poll_metadata(&self) -> Result<MetadataWait, StreamError> {
        loop {
            if self.handle.is_finished().await? {
                return Ok(MetadataWait::AlreadyFinished);
            }
            if self.handle.has_metadata().await? {
                return Ok(MetadataWait::Ready);
            }
            tracing::debug!("Waiting for metadata of {}", self.context.info_hash);
            tokio::time::sleep(self.playback.poll_interval).await;
        }
    }

    async fn await_cache_fill(&self, file: &FileEntry) -> Result<f64, StreamError> {
        let budget = self.playback.cache_fill_timeout;
        let threshold = self.playback.cache_fill_threshold_percent;

        let waited = tokio::time::timeout(budget, self.poll_cache_fill(file, threshold)).await;
        match waited {
            Ok(result) => result,
            Err(_) => {
                let percent = self.catalog.completed_percent(file).await.unwrap_or(0.0);
                Err(StreamError::CacheFillTimeout {
                    path: file.path().to_string(),
                    percent,
                    threshold,
                    timeout: budget,
                })
            }
        }
    }

    async fn poll_cache_fill(&self, file: &FileEntry, threshold: f64) -> Result<f64, StreamError> {
        loop {
            let percent = self.catalog.completed_percent(file).await?;
            if percent >= threshold {
                tracing::info!(
                    "{} reached {:.2}% (threshold {}%)",
                    file.path(),
                    percent,
                    threshold
                );
                return Ok(percent);
            }
            tracing::debug!("{} at {:.2}% of {}%", file.path(), percent, threshold);
            tokio::time::sleep(self.playback.poll_interval).await;
        }
    }

    /// Continued download until every wanted file is complete.
    async fn await_download(&self) -> Result<(), StreamError> {
        while !self.handle.is_finished().await? {
            tokio::time::sleep(self.playback.poll_interval).await;
        }
        tracing::info!("Download of {} finished", self.context.info_hash);
        Ok(())
    }

    async fn release(&self) {
        if let Err(e) = self.resources.release().await {
            tracing::warn!("Failed to release {}: {}", self.context.info_hash, e);
        }
    }

    fn transition(&self, next: StreamState) {
        let previous = self.state.send_replace(next.clone());
        tracing::info!("Stream {}: {} -> {}", self.context.info_hash, previous, next);
    }

    fn outcome(&self, file: FileEntry, fast_path: bool) -> StreamOutcome {
        StreamOutcome {
            file,
            fast_path,
            elapsed: self.started.elapsed(),
        }
    }
}
