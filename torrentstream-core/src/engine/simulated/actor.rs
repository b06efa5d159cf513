//! Actor driving one simulated download.

use std::collections::VecDeque;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::commands::SimulatedCommand;
use super::{SimulatedFile, SwarmProfile};
use crate::engine::{
    Alert, AlertKind, AlertSeverity, EngineError, FilePriority, InfoHash, StatusSnapshot,
    TorrentFile, TorrentState,
};

/// Upper bound on queued alerts; the oldest are dropped beyond it.
const MAX_PENDING_ALERTS: usize = 1000;

/// State of one simulated download, owned exclusively by its actor.
pub(super) struct SimulatedTorrent {
    info_hash: InfoHash,
    name: String,
    files: Vec<SimulatedFile>,
    completed: Vec<u64>,
    priorities: Vec<FilePriority>,
    priority_history: Vec<Vec<FilePriority>>,
    sequential: bool,
    has_metadata: bool,
    finished: bool,
    ticks_elapsed: u32,
    last_tick_bytes: u64,
    total_download: u64,
    alerts: VecDeque<Alert>,
    save_path: PathBuf,
    profile: SwarmProfile,
}

impl SimulatedTorrent {
    pub(super) fn new(
        info_hash: InfoHash,
        name: String,
        files: Vec<SimulatedFile>,
        save_path: PathBuf,
        profile: SwarmProfile,
    ) -> Self {
        let file_count = files.len();
        let completed = if profile.preseeded {
            files.iter().map(|file| file.size).collect()
        } else {
            vec![0; file_count]
        };

        let mut torrent = Self {
            info_hash,
            name,
            files,
            completed,
            priorities: vec![FilePriority::DEFAULT; file_count],
            priority_history: Vec::new(),
            sequential: false,
            has_metadata: profile.preseeded || profile.metadata_after_ticks == Some(0),
            finished: false,
            ticks_elapsed: 0,
            last_tick_bytes: 0,
            total_download: 0,
            alerts: VecDeque::new(),
            save_path,
            profile,
        };

        torrent.push_alert(Alert::info(
            AlertKind::TorrentAdded,
            format!("added torrent {}", torrent.info_hash),
        ));
        torrent.finished = torrent.has_metadata && torrent.wanted_complete();
        torrent
    }

    fn push_alert(&mut self, alert: Alert) {
        if self.alerts.len() >= MAX_PENDING_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    fn wanted_complete(&self) -> bool {
        self.files
            .iter()
            .zip(&self.completed)
            .zip(&self.priorities)
            .all(|((file, done), priority)| !priority.is_wanted() || *done >= file.size)
    }

    fn state(&self) -> TorrentState {
        if !self.has_metadata {
            TorrentState::DownloadingMetadata
        } else if self.finished && self.completed_bytes() == self.total_size() {
            TorrentState::Seeding
        } else if self.finished {
            TorrentState::Finished
        } else {
            TorrentState::Downloading
        }
    }

    fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }

    fn completed_bytes(&self) -> u64 {
        self.completed.iter().sum()
    }

    fn status(&self) -> StatusSnapshot {
        let (wanted, done) = self
            .files
            .iter()
            .zip(&self.completed)
            .zip(&self.priorities)
            .filter(|(_, priority)| priority.is_wanted())
            .fold((0u64, 0u64), |(wanted, done), ((file, completed), _)| {
                (wanted + file.size, done + completed)
            });

        let progress = if !self.has_metadata {
            0.0
        } else if wanted == 0 {
            1.0
        } else {
            done as f32 / wanted as f32
        };

        let tick_secs = self.profile.tick.as_secs_f64();
        let download_rate = if tick_secs > 0.0 {
            (self.last_tick_bytes as f64 / tick_secs) as u64
        } else {
            0
        };

        StatusSnapshot {
            name: if self.has_metadata {
                self.name.clone()
            } else {
                "N/A".to_string()
            },
            state: self.state(),
            download_rate,
            upload_rate: 0,
            total_download: self.total_download,
            total_upload: 0,
            total_done: done,
            num_peers: self.profile.peers,
            num_seeds: self.profile.seeds,
            progress,
            sequential: self.sequential,
        }
    }

    fn set_file_priorities(
        &mut self,
        priorities: Vec<(usize, FilePriority)>,
    ) -> Result<(), EngineError> {
        if !self.has_metadata {
            return Err(EngineError::MetadataUnavailable {
                info_hash: self.info_hash,
            });
        }

        let file_count = self.files.len();
        if let Some((index, _)) = priorities.iter().find(|(index, _)| *index >= file_count) {
            return Err(EngineError::FileIndexOutOfRange {
                index: *index,
                file_count,
            });
        }

        for (index, priority) in priorities {
            self.priorities[index] = priority;
        }
        self.priority_history.push(self.priorities.clone());

        // Re-evaluated on the next tick, like a real engine re-checking wanted pieces.
        if !self.wanted_complete() {
            self.finished = false;
        }
        Ok(())
    }

    /// Advances the swarm by one tick and returns the bytes received per file.
    fn tick(&mut self) -> Vec<(usize, u64)> {
        self.ticks_elapsed = self.ticks_elapsed.saturating_add(1);
        self.last_tick_bytes = 0;

        if !self.has_metadata {
            if self
                .profile
                .metadata_after_ticks
                .is_some_and(|ticks| self.ticks_elapsed >= ticks)
            {
                self.has_metadata = true;
                self.push_alert(Alert::info(
                    AlertKind::MetadataReceived,
                    format!("metadata received for {} ({} files)", self.name, self.files.len()),
                ));
                self.push_alert(Alert::info(
                    AlertKind::PeerConnected,
                    format!("{} peers, {} seeds", self.profile.peers, self.profile.seeds),
                ));
            }
            return Vec::new();
        }

        let received = self.distribute(self.profile.bytes_per_tick);
        for &(index, bytes) in &received {
            self.completed[index] += bytes;
            self.last_tick_bytes += bytes;
            if self.completed[index] >= self.files[index].size {
                self.push_alert(Alert::info(
                    AlertKind::FileCompleted,
                    format!("file completed: {}", self.files[index].path),
                ));
            }
        }
        self.total_download += self.last_tick_bytes;

        if !self.finished && self.wanted_complete() {
            self.finished = true;
            self.push_alert(Alert::info(
                AlertKind::TorrentFinished,
                format!("torrent finished: {}", self.name),
            ));
            self.push_alert(Alert::info(
                AlertKind::StateChanged,
                format!("state changed to {}", self.state()),
            ));
        }

        received
    }

    /// Splits a byte budget across wanted, incomplete files.
    ///
    /// Sequential mode fills files strictly in index order; otherwise the
    /// budget is spread evenly, highest priority first.
    fn distribute(&self, budget: u64) -> Vec<(usize, u64)> {
        let mut pending: Vec<usize> = (0..self.files.len())
            .filter(|&index| {
                self.priorities[index].is_wanted() && self.completed[index] < self.files[index].size
            })
            .collect();

        if !self.sequential {
            pending.sort_by_key(|&index| std::cmp::Reverse(self.priorities[index]));
        }

        let mut remaining = budget;
        let mut received = Vec::new();
        let share = if self.sequential || pending.is_empty() {
            budget
        } else {
            (budget / pending.len() as u64).max(1)
        };

        for index in pending {
            if remaining == 0 {
                break;
            }
            let missing = self.files[index].size - self.completed[index];
            let take = missing.min(share).min(remaining);
            if take > 0 {
                received.push((index, take));
                remaining -= take;
            }
        }

        received
    }

    fn file_path(&self, index: usize) -> PathBuf {
        self.save_path.join(&self.files[index].path)
    }

    async fn materialize(&mut self, received: &[(usize, u64)]) {
        for &(index, bytes) in received {
            let path = self.file_path(index);
            if let Err(e) = append_filler(&path, bytes).await {
                self.push_alert(Alert::new(
                    AlertKind::StorageFailed,
                    AlertSeverity::Error,
                    format!("failed to write {}: {e}", path.display()),
                ));
            }
        }
    }

    async fn delete_files(&self) {
        for index in 0..self.files.len() {
            let path = self.file_path(index);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
            }
        }
    }

    /// Handles a single command. Returns false when the actor should stop.
    async fn handle_command(&mut self, command: SimulatedCommand) -> bool {
        match command {
            SimulatedCommand::HasMetadata { responder } => {
                let _ = responder.send(self.has_metadata);
            }
            SimulatedCommand::IsFinished { responder } => {
                let _ = responder.send(self.has_metadata && self.finished);
            }
            SimulatedCommand::Status { responder } => {
                let _ = responder.send(self.status());
            }
            SimulatedCommand::SetSequential { enabled, responder } => {
                self.sequential = enabled;
                let _ = responder.send(());
            }
            SimulatedCommand::Files { responder } => {
                let result = if self.has_metadata {
                    Ok(self
                        .files
                        .iter()
                        .map(|file| TorrentFile {
                            path: file.path.clone(),
                            size: file.size,
                        })
                        .collect())
                } else {
                    Err(EngineError::MetadataUnavailable {
                        info_hash: self.info_hash,
                    })
                };
                let _ = responder.send(result);
            }
            SimulatedCommand::FileProgress { responder } => {
                let progress = if self.has_metadata {
                    self.completed.clone()
                } else {
                    Vec::new()
                };
                let _ = responder.send(progress);
            }
            SimulatedCommand::FilePriorities { responder } => {
                let _ = responder.send(self.priorities.clone());
            }
            SimulatedCommand::SetFilePriorities {
                priorities,
                responder,
            } => {
                let _ = responder.send(self.set_file_priorities(priorities));
            }
            SimulatedCommand::PopAlert { responder } => {
                let _ = responder.send(self.alerts.pop_front());
            }
            SimulatedCommand::PriorityHistory { responder } => {
                let _ = responder.send(self.priority_history.clone());
            }
            SimulatedCommand::Shutdown {
                delete_files,
                responder,
            } => {
                if delete_files {
                    self.delete_files().await;
                }
                let _ = responder.send(());
                return false;
            }
        }
        true
    }
}

async fn append_filler(path: &std::path::Path, bytes: u64) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&vec![0u8; bytes as usize]).await?;
    file.flush().await
}

/// Runs the actor loop until shutdown or until every handle is dropped.
pub(super) async fn run_actor_loop(
    mut torrent: SimulatedTorrent,
    mut receiver: mpsc::Receiver<SimulatedCommand>,
) {
    tracing::debug!("Simulated torrent {} started", torrent.info_hash);

    let tick = torrent.profile.tick;
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = receiver.recv() => {
                let Some(command) = command else { break };
                if !torrent.handle_command(command).await {
                    break;
                }
            }
            _ = ticker.tick() => {
                let received = torrent.tick();
                if torrent.profile.materialize && !received.is_empty() {
                    torrent.materialize(&received).await;
                }
            }
        }
    }

    tracing::debug!("Simulated torrent {} stopped", torrent.info_hash);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn torrent(profile: SwarmProfile) -> SimulatedTorrent {
        SimulatedTorrent::new(
            InfoHash::new([7u8; 20]),
            "movie".to_string(),
            vec![
                SimulatedFile::new("movie/sample.mkv", 100),
                SimulatedFile::new("movie/movie.mkv", 1000),
            ],
            PathBuf::from("/nonexistent"),
            profile,
        )
    }

    fn profile() -> SwarmProfile {
        SwarmProfile {
            tick: Duration::from_secs(1),
            metadata_after_ticks: Some(1),
            bytes_per_tick: 100,
            ..SwarmProfile::default()
        }
    }

    #[test]
    fn test_metadata_arrives_after_configured_ticks() {
        let mut torrent = torrent(profile());
        assert!(!torrent.has_metadata);
        assert_eq!(torrent.status().name, "N/A");

        torrent.tick();

        assert!(torrent.has_metadata);
        assert_eq!(torrent.status().name, "movie");
    }

    #[test]
    fn test_sequential_fills_in_index_order() {
        let mut torrent = torrent(profile());
        torrent.tick();
        torrent.sequential = true;

        let received = torrent.tick();

        assert_eq!(received, vec![(0, 100)]);
    }

    #[test]
    fn test_skipped_files_receive_nothing_and_finish_counts_wanted_only() {
        let mut torrent = torrent(SwarmProfile {
            bytes_per_tick: 2000,
            ..profile()
        });
        torrent.tick();
        torrent
            .set_file_priorities(vec![(0, FilePriority::SKIP), (1, FilePriority::MAXIMUM)])
            .unwrap();

        torrent.tick();

        assert_eq!(torrent.completed, vec![0, 1000]);
        assert!(torrent.finished);
        assert_eq!(torrent.state(), TorrentState::Finished);
    }

    #[test]
    fn test_priorities_rejected_before_metadata() {
        let mut torrent = torrent(profile());
        let result = torrent.set_file_priorities(vec![(0, FilePriority::SKIP)]);
        assert!(matches!(result, Err(EngineError::MetadataUnavailable { .. })));
        assert!(torrent.priority_history.is_empty());
    }

    #[test]
    fn test_out_of_range_priority_leaves_state_untouched() {
        let mut torrent = torrent(profile());
        torrent.tick();

        let result = torrent.set_file_priorities(vec![(0, FilePriority::SKIP), (5, FilePriority::MAXIMUM)]);

        assert!(matches!(
            result,
            Err(EngineError::FileIndexOutOfRange { index: 5, file_count: 2 })
        ));
        assert_eq!(torrent.priorities, vec![FilePriority::DEFAULT; 2]);
    }

    #[test]
    fn test_preseeded_torrent_starts_finished() {
        let torrent = torrent(SwarmProfile {
            preseeded: true,
            ..profile()
        });
        assert!(torrent.has_metadata);
        assert!(torrent.finished);
        assert_eq!(torrent.state(), TorrentState::Seeding);
    }
}
