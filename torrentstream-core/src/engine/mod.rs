//! Torrent engine capability interface
//!
//! The orchestrator never touches a download engine directly. It drives one
//! through [`TorrentEngine`] (the session) and [`TorrentHandle`] (one magnet
//! download), which cover exactly the commands and predicates progressive
//! playback needs.

pub mod magnet;
pub mod simulated;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use magnet::{InfoHash, MagnetLink};
pub use simulated::{SimulatedEngine, SimulatedFile, SwarmProfile};

use crate::config::EngineConfig;

/// Download session owning zero or more torrent handles.
///
/// One orchestration run borrows a session; it never owns the session's
/// lifecycle.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Session-wide settings the engine was created with.
    fn settings(&self) -> &EngineConfig;

    /// Ingests a magnet link and returns the handle of the new download.
    ///
    /// # Errors
    /// - `EngineError::DuplicateTorrent` - Info hash already in the session
    /// - `EngineError::Io` - Save path could not be prepared
    async fn add_torrent(
        &self,
        magnet: &MagnetLink,
        params: AddTorrentParams,
    ) -> Result<Arc<dyn TorrentHandle>, EngineError>;

    /// Removes a download from the session, optionally deleting its content.
    ///
    /// # Errors
    /// - `EngineError::TorrentNotFound` - Info hash not in the session
    async fn remove_torrent(&self, info_hash: InfoHash, delete_files: bool)
    -> Result<(), EngineError>;

    /// Number of downloads currently held by the session.
    fn active_torrents(&self) -> usize;
}

/// Handle for a single magnet download.
///
/// Polling accessors never fail just because metadata is missing; they return
/// `false`/empty values instead. [`TorrentHandle::files`] is the exception and
/// reports [`EngineError::MetadataUnavailable`].
#[async_trait]
pub trait TorrentHandle: Send + Sync {
    fn info_hash(&self) -> InfoHash;

    async fn has_metadata(&self) -> Result<bool, EngineError>;

    /// True once every wanted (non-zero priority) file is complete.
    async fn is_finished(&self) -> Result<bool, EngineError>;

    async fn status(&self) -> Result<StatusSnapshot, EngineError>;

    async fn set_sequential(&self, enabled: bool) -> Result<(), EngineError>;

    /// Files in engine index order.
    ///
    /// # Errors
    /// - `EngineError::MetadataUnavailable` - Called before metadata arrived
    async fn files(&self) -> Result<Vec<TorrentFile>, EngineError>;

    /// Completed bytes per file, in the same order as [`TorrentHandle::files`].
    async fn file_progress(&self) -> Result<Vec<u64>, EngineError>;

    async fn file_priorities(&self) -> Result<Vec<FilePriority>, EngineError>;

    /// Commits a batch of `(file index, priority)` pairs in one engine call.
    ///
    /// # Errors
    /// - `EngineError::MetadataUnavailable` - Called before metadata arrived
    /// - `EngineError::FileIndexOutOfRange` - Index beyond the file list
    async fn set_file_priorities(
        &self,
        priorities: &[(usize, FilePriority)],
    ) -> Result<(), EngineError>;

    /// Pops the oldest pending alert without waiting.
    async fn pop_alert(&self) -> Result<Option<Alert>, EngineError>;
}

/// Parameters used when ingesting a magnet link.
#[derive(Debug, Clone)]
pub struct AddTorrentParams {
    pub save_path: PathBuf,
    pub storage_mode: StorageMode,
    pub auto_managed: bool,
}

impl AddTorrentParams {
    pub fn new(save_path: PathBuf) -> Self {
        Self {
            save_path,
            storage_mode: StorageMode::default(),
            auto_managed: true,
        }
    }
}

/// Disk allocation strategy for downloaded content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    #[default]
    Sparse,
    Allocate,
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sparse" => Ok(Self::Sparse),
            "allocate" => Ok(Self::Allocate),
            _ => Err(format!(
                "Invalid storage mode: '{s}'. Valid options are: sparse, allocate"
            )),
        }
    }
}

/// File as reported by the engine once metadata is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub path: String,
    pub size: u64,
}

/// Scheduling weight of a file. `0` skips the file, `7` is maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilePriority(u8);

impl FilePriority {
    pub const SKIP: Self = Self(0);
    pub const DEFAULT: Self = Self(4);
    pub const MAXIMUM: Self = Self(7);

    /// Returns `None` for weights above [`FilePriority::MAXIMUM`].
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAXIMUM.0).then_some(Self(value))
    }

    pub fn is_wanted(self) -> bool {
        self.0 > 0
    }
}

impl Default for FilePriority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for FilePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-side torrent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TorrentState {
    Queued,
    Checking,
    DownloadingMetadata,
    Downloading,
    Finished,
    Seeding,
    Allocating,
    CheckingFastresume,
}

impl TorrentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Checking => "checking",
            Self::DownloadingMetadata => "downloading_metadata",
            Self::Downloading => "downloading",
            Self::Finished => "finished",
            Self::Seeding => "seeding",
            Self::Allocating => "allocating",
            Self::CheckingFastresume => "checking_fastresume",
        }
    }
}

impl fmt::Display for TorrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time aggregate status of one download.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Torrent name, `"N/A"` until metadata arrives
    pub name: String,
    pub state: TorrentState,
    /// Current download rate in bytes per second
    pub download_rate: u64,
    /// Current upload rate in bytes per second
    pub upload_rate: u64,
    pub total_download: u64,
    pub total_upload: u64,
    /// Bytes of wanted content present on disk
    pub total_done: u64,
    pub num_peers: u32,
    pub num_seeds: u32,
    /// Fraction of wanted content present (0.0 to 1.0)
    pub progress: f32,
    pub sequential: bool,
}

impl StatusSnapshot {
    /// Progress formatted the way status lines print it.
    pub fn progress_formatted(&self) -> String {
        format!("{:5.4}%", self.progress * 100.0)
    }
}

/// Severity attached to an engine alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Category of an engine alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    TorrentAdded,
    MetadataReceived,
    StateChanged,
    PeerConnected,
    FileCompleted,
    TorrentFinished,
    StorageFailed,
}

/// Informational engine event. Alerts never drive control flow.
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }

    pub fn info(kind: AlertKind, message: impl Into<String>) -> Self {
        Self::new(kind, AlertSeverity::Info, message)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

/// Errors surfaced by a torrent engine adapter.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid magnet link: {reason}")]
    InvalidMagnetLink { reason: String },

    #[error("Torrent {info_hash} has no metadata yet")]
    MetadataUnavailable { info_hash: InfoHash },

    #[error("Torrent {info_hash} not found")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("Torrent {info_hash} already added")]
    DuplicateTorrent { info_hash: InfoHash },

    #[error("File index {index} out of range ({file_count} files)")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Engine shut down")]
    EngineShutdown,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
