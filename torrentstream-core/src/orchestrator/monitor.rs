//! Alert and progress monitor
//!
//! Runs beside every playback run. Each interval it drains pending engine
//! alerts into the log and republishes the run's progress. Monitor faults are
//! logged and dropped; they never reach the run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::catalog::FileEntry;
use crate::engine::{Alert, AlertSeverity, EngineError, StatusSnapshot, TorrentHandle};
use crate::tracing_setup::ALERTS_TARGET;

/// Progress published by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct StreamProgress {
    /// Selected file, once known
    pub file_path: Option<String>,
    /// Completion of the selected file in percent
    pub file_percent: Option<f64>,
    pub status: StatusSnapshot,
}

/// Monitor loop; returns when `token` is cancelled.
pub(crate) async fn run_monitor(
    handle: Arc<dyn TorrentHandle>,
    selected: watch::Receiver<Option<FileEntry>>,
    progress: watch::Sender<Option<StreamProgress>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = report(handle.as_ref(), &selected, &progress).await {
                    tracing::warn!("Monitor for {} skipped a report: {}", handle.info_hash(), e);
                }
            }
        }
    }

    if let Err(e) = drain_alerts(handle.as_ref()).await {
        tracing::debug!("Final alert drain for {} failed: {}", handle.info_hash(), e);
    }
    tracing::debug!("Monitor for {} stopped", handle.info_hash());
}

async fn report(
    handle: &dyn TorrentHandle,
    selected: &watch::Receiver<Option<FileEntry>>,
    progress: &watch::Sender<Option<StreamProgress>>,
) -> Result<(), EngineError> {
    drain_alerts(handle).await?;

    let status = handle.status().await?;
    let file = selected.borrow().clone();
    let file_percent = match &file {
        Some(file) => handle
            .file_progress()
            .await?
            .get(file.index())
            .map(|bytes| file.completed_percent(*bytes)),
        None => None,
    };

    if let (Some(file), Some(percent)) = (&file, file_percent) {
        tracing::trace!(
            "{}: {:.2}% ({}, {} B/s, {} peers)",
            file.path(),
            percent,
            status.state,
            status.download_rate,
            status.num_peers
        );
    }

    progress.send_replace(Some(StreamProgress {
        file_path: file.map(|file| file.path().to_string()),
        file_percent,
        status,
    }));
    Ok(())
}

/// Forwards every pending alert to the log.
async fn drain_alerts(handle: &dyn TorrentHandle) -> Result<usize, EngineError> {
    let mut drained = 0;
    while let Some(alert) = handle.pop_alert().await? {
        forward(&alert);
        drained += 1;
    }
    Ok(drained)
}

fn forward(alert: &Alert) {
    match alert.severity {
        AlertSeverity::Debug => tracing::debug!(target: ALERTS_TARGET, "{alert}"),
        AlertSeverity::Info => tracing::info!(target: ALERTS_TARGET, "{alert}"),
        AlertSeverity::Warning => tracing::warn!(target: ALERTS_TARGET, "{alert}"),
        AlertSeverity::Error | AlertSeverity::Critical => {
            tracing::error!(target: ALERTS_TARGET, "{alert}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{
        AddTorrentParams, MagnetLink, SimulatedEngine, SimulatedFile, SwarmProfile, TorrentEngine,
    };

    const MAGNET: &str = "magnet:?xt=urn:btih:00112233445566778899aabbccddeeff00112233";

    async fn setup() -> (SimulatedEngine, Arc<dyn TorrentHandle>, tempfile::TempDir) {
        let engine = SimulatedEngine::new(
            EngineConfig::default(),
            SwarmProfile {
                tick: Duration::from_millis(100),
                metadata_after_ticks: Some(0),
                bytes_per_tick: 10,
                ..SwarmProfile::default()
            },
        );
        let magnet = MagnetLink::parse(MAGNET).unwrap();
        engine.register_content(magnet.info_hash(), vec![SimulatedFile::new("movie.mkv", 1000)]);
        let dir = tempfile::tempdir().unwrap();
        let handle = engine
            .add_torrent(&magnet, AddTorrentParams::new(dir.path().to_path_buf()))
            .await
            .unwrap();
        (engine, handle, dir)
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_progress_and_drains_alerts() {
        let (_engine, handle, _dir) = setup().await;
        let (_selected_tx, selected_rx) =
            watch::channel(Some(FileEntry::new(0, "movie.mkv", 1000)));
        let (progress_tx, progress_rx) = watch::channel(None);
        let token = CancellationToken::new();

        let monitor = tokio::spawn(run_monitor(
            handle.clone(),
            selected_rx,
            progress_tx,
            Duration::from_millis(250),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1050)).await;

        let progress = progress_rx.borrow().clone().unwrap();
        assert_eq!(progress.file_path.as_deref(), Some("movie.mkv"));
        assert!(progress.file_percent.unwrap() > 0.0);
        assert!(handle.pop_alert().await.unwrap().is_none());

        token.cancel();
        monitor.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_survives_engine_faults() {
        let (engine, handle, _dir) = setup().await;
        let (_selected_tx, selected_rx) = watch::channel(None);
        let (progress_tx, progress_rx) = watch::channel(None);
        let token = CancellationToken::new();

        engine
            .remove_torrent(handle.info_hash(), false)
            .await
            .unwrap();

        let monitor = tokio::spawn(run_monitor(
            handle,
            selected_rx,
            progress_tx,
            Duration::from_millis(100),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!monitor.is_finished());
        assert!(progress_rx.borrow().is_none());

        token.cancel();
        monitor.await.unwrap();
    }
}
