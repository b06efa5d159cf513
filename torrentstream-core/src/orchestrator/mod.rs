//! Progressive playback orchestration
//!
//! Drives one torrent handle through
//! `INIT -> AWAITING_METADATA -> FILE_SELECTED -> PRIORITIZED -> CACHE_FILLING
//! -> STREAMING -> DONE`, with `FAILED(reason)` and `CANCELLED` as the other
//! terminal states. Each run executes in its own task and is observed and
//! cancelled through a [`StreamController`].

mod active;
mod coordinator;
pub mod monitor;
mod types;

use std::time::Duration;

pub use active::{ActiveStream, StreamController};
pub use coordinator::PlaybackOrchestrator;
pub use monitor::StreamProgress;
pub use types::{FailureReason, StreamOutcome, StreamRequest, StreamState};

use crate::engine::EngineError;

/// Errors that end a playback run.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("No metadata received within {timeout:?}")]
    MetadataTimeout { timeout: Duration },

    #[error("No playable file among {file_count} files")]
    NoPlayableSource { file_count: usize },

    #[error("{path} reached {percent:.2}% of the required {threshold}% within {timeout:?}")]
    CacheFillTimeout {
        path: String,
        percent: f64,
        threshold: f64,
        timeout: Duration,
    },

    #[error("Engine fault: {0}")]
    Engine(#[from] EngineError),

    #[error("Playback failed: {reason}")]
    Playback { reason: String },

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Stream task aborted: {reason}")]
    Aborted { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Reason recorded in `FAILED(reason)`; `None` for cancellation.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::MetadataTimeout { .. } => Some(FailureReason::MetadataTimeout),
            Self::NoPlayableSource { .. } => Some(FailureReason::NoPlayableSource),
            Self::CacheFillTimeout { .. } => Some(FailureReason::CacheFillTimeout),
            Self::Engine(_) | Self::Io(_) => Some(FailureReason::EngineFault),
            Self::Playback { .. } => Some(FailureReason::PlaybackFault),
            Self::Aborted { .. } => Some(FailureReason::Aborted),
            Self::Cancelled => None,
        }
    }
}
