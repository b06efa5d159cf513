//! In-process torrent engine for development and tests
//!
//! Every added torrent runs as its own actor that advances a synthetic swarm
//! on a fixed tick. Metadata arrival, download speed and pre-seeded content
//! are controlled by a [`SwarmProfile`], which makes every orchestrator
//! timeout reachable under a paused tokio clock.

mod actor;
mod commands;
mod handle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

pub use handle::SimulatedHandle;

use self::actor::{SimulatedTorrent, run_actor_loop};
use super::{
    AddTorrentParams, EngineError, FilePriority, InfoHash, MagnetLink, TorrentEngine,
    TorrentHandle,
};
use crate::config::{EngineConfig, SimulationConfig};

/// Behaviour of the synthetic swarm behind every simulated torrent.
#[derive(Debug, Clone)]
pub struct SwarmProfile {
    /// Interval between swarm updates
    pub tick: Duration,
    /// Ticks until metadata arrives (`None` = never)
    pub metadata_after_ticks: Option<u32>,
    /// Bytes received per tick, shared across wanted files
    pub bytes_per_tick: u64,
    pub peers: u32,
    pub seeds: u32,
    /// Content is complete as soon as the torrent is added
    pub preseeded: bool,
    /// Write received bytes to the save path
    pub materialize: bool,
    /// Size of the main file in synthesized content
    pub synthesized_size: u64,
}

impl Default for SwarmProfile {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            metadata_after_ticks: Some(3),
            bytes_per_tick: 4 * 1024 * 1024,
            peers: 12,
            seeds: 4,
            preseeded: false,
            materialize: false,
            synthesized_size: 700 * 1024 * 1024,
        }
    }
}

impl From<&SimulationConfig> for SwarmProfile {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            tick: config.tick,
            metadata_after_ticks: config.metadata_after_ticks,
            bytes_per_tick: config.bytes_per_tick,
            peers: config.peers,
            seeds: config.seeds,
            preseeded: config.preseeded,
            materialize: config.materialize,
            synthesized_size: config.synthesized_size,
        }
    }
}

/// File served by the synthetic swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedFile {
    pub path: String,
    pub size: u64,
}

impl SimulatedFile {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// Torrent session backed by simulated swarms.
pub struct SimulatedEngine {
    config: EngineConfig,
    profile: SwarmProfile,
    contents: RwLock<HashMap<InfoHash, Vec<SimulatedFile>>>,
    torrents: RwLock<HashMap<InfoHash, SimulatedHandle>>,
}

impl SimulatedEngine {
    pub fn new(config: EngineConfig, profile: SwarmProfile) -> Self {
        tracing::info!(
            "Simulated session listening on ports {}-{} with extensions [{}], {} DHT routers",
            config.listen_ports.0,
            config.listen_ports.1,
            config.extensions.join(", "),
            config.dht_routers.len()
        );

        Self {
            config,
            profile,
            contents: RwLock::new(HashMap::new()),
            torrents: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the file list a magnet with `info_hash` will resolve to.
    ///
    /// Unregistered magnets resolve to synthesized content named after the
    /// link's display name.
    pub fn register_content(&self, info_hash: InfoHash, files: Vec<SimulatedFile>) {
        self.contents.write().insert(info_hash, files);
    }

    /// Concrete handle of an active torrent.
    pub fn handle(&self, info_hash: InfoHash) -> Option<SimulatedHandle> {
        self.torrents.read().get(&info_hash).cloned()
    }

    /// Every priority vector committed to a torrent, oldest first.
    ///
    /// # Errors
    /// - `EngineError::TorrentNotFound` - Info hash not in the session
    pub async fn priority_history(
        &self,
        info_hash: InfoHash,
    ) -> Result<Vec<Vec<FilePriority>>, EngineError> {
        self.handle(info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })?
            .priority_history()
            .await
    }

    fn resolve_content(&self, magnet: &MagnetLink) -> (String, Vec<SimulatedFile>) {
        let info_hash = magnet.info_hash();
        let name = magnet
            .display_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("torrent-{}", info_hash.short()));

        if let Some(files) = self.contents.read().get(&info_hash) {
            return (name, files.clone());
        }

        let main_size = self.profile.synthesized_size;
        let files = vec![
            SimulatedFile::new(format!("{name}/sample.mkv"), (main_size / 50).max(1)),
            SimulatedFile::new(format!("{name}/{name}.mkv"), main_size),
            SimulatedFile::new(format!("{name}/{name}.nfo"), 4096),
        ];
        (name, files)
    }
}

#[async_trait]
impl TorrentEngine for SimulatedEngine {
    fn settings(&self) -> &EngineConfig {
        &self.config
    }

    async fn add_torrent(
        &self,
        magnet: &MagnetLink,
        params: AddTorrentParams,
    ) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        let info_hash = magnet.info_hash();
        if self.torrents.read().contains_key(&info_hash) {
            return Err(EngineError::DuplicateTorrent { info_hash });
        }

        tokio::fs::create_dir_all(&params.save_path).await?;

        let (name, files) = self.resolve_content(magnet);
        tracing::debug!(
            "Adding {} to simulated session ({} files, {:?} storage, save path {})",
            info_hash,
            files.len(),
            params.storage_mode,
            params.save_path.display()
        );

        let (sender, receiver) = mpsc::channel(100);
        let torrent = SimulatedTorrent::new(
            info_hash,
            name,
            files,
            params.save_path,
            self.profile.clone(),
        );
        tokio::spawn(run_actor_loop(torrent, receiver));

        let handle = SimulatedHandle::new(info_hash, sender);
        self.torrents.write().insert(info_hash, handle.clone());

        Ok(Arc::new(handle))
    }

    async fn remove_torrent(
        &self,
        info_hash: InfoHash,
        delete_files: bool,
    ) -> Result<(), EngineError> {
        let handle = self
            .torrents
            .write()
            .remove(&info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })?;

        match handle.shutdown(delete_files).await {
            Ok(()) | Err(EngineError::EngineShutdown) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn active_torrents(&self) -> usize {
        self.torrents.read().len()
    }
}
