//! Torrentstream Core - progressive playback over BitTorrent
//!
//! Starts playing a file from a magnet download before the download ends:
//! wait for metadata, pick one playable file, focus the engine on it, wait
//! until a small prefix is on disk, then hand the file to a stream function
//! while the download continues.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod scheduler;
pub mod selector;
pub mod stream;
pub mod tracing_setup;

pub use catalog::{FileCatalog, FileEntry, MediaKind};
pub use config::StreamConfig;
pub use engine::{EngineError, InfoHash, MagnetLink, TorrentEngine, TorrentHandle};
pub use orchestrator::{
    ActiveStream, FailureReason, PlaybackOrchestrator, StreamController, StreamError,
    StreamOutcome, StreamProgress, StreamRequest, StreamState,
};
pub use selector::{FileSelector, FirstFile, FirstMedia, LargestMedia};
pub use stream::{PlayerLauncher, StreamContext, StreamFunction};

/// Errors that can bubble up from any torrentstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TorrentStreamError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TorrentStreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            TorrentStreamError::Stream(e) => match e {
                StreamError::MetadataTimeout { timeout } => {
                    format!("No peer sent the torrent metadata within {}s", timeout.as_secs())
                }
                StreamError::NoPlayableSource { .. } => {
                    "The torrent contains no playable media file".to_string()
                }
                StreamError::CacheFillTimeout { path, .. } => {
                    format!("Download of {path} is too slow to start playback")
                }
                StreamError::Playback { reason } => format!("Player failed: {reason}"),
                StreamError::Cancelled => "Stream cancelled".to_string(),
                _ => "Streaming error occurred".to_string(),
            },
            TorrentStreamError::Engine(EngineError::InvalidMagnetLink { reason }) => {
                format!("Invalid magnet link: {reason}")
            }
            TorrentStreamError::Engine(_) => "Download engine error occurred".to_string(),
            TorrentStreamError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            TorrentStreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TorrentStreamError::Configuration { .. }
                | TorrentStreamError::Engine(EngineError::InvalidMagnetLink { .. })
                | TorrentStreamError::Stream(StreamError::NoPlayableSource { .. })
        )
    }
}
