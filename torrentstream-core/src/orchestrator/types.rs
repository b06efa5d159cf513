//! Request, state and outcome types of a playback run.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::catalog::FileEntry;
use crate::engine::{MagnetLink, StorageMode};
use crate::selector::FileSelector;
use crate::stream::StreamFunction;

/// Position of a run in the playback state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Init,
    AwaitingMetadata,
    FileSelected,
    Prioritized,
    CacheFilling,
    Streaming,
    Done,
    Failed(FailureReason),
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::Cancelled)
    }

    /// True once the stream function has (or had) the selected file.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming | Self::Done)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("INIT"),
            Self::AwaitingMetadata => f.write_str("AWAITING_METADATA"),
            Self::FileSelected => f.write_str("FILE_SELECTED"),
            Self::Prioritized => f.write_str("PRIORITIZED"),
            Self::CacheFilling => f.write_str("CACHE_FILLING"),
            Self::Streaming => f.write_str("STREAMING"),
            Self::Done => f.write_str("DONE"),
            Self::Failed(reason) => write!(f, "FAILED({reason})"),
            Self::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

/// Named cause of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    MetadataTimeout,
    NoPlayableSource,
    CacheFillTimeout,
    EngineFault,
    PlaybackFault,
    Aborted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MetadataTimeout => "MetadataTimeout",
            Self::NoPlayableSource => "NoPlayableSource",
            Self::CacheFillTimeout => "CacheFillTimeout",
            Self::EngineFault => "EngineFault",
            Self::PlaybackFault => "PlaybackFault",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// Everything one playback run needs. Immutable once started.
#[derive(Clone)]
pub struct StreamRequest {
    pub magnet: MagnetLink,
    pub selector: Arc<dyn FileSelector>,
    pub stream_fn: Arc<dyn StreamFunction>,
    /// Download directory (None = temporary directory for this run)
    pub save_path: Option<PathBuf>,
    /// Overrides the session's storage mode
    pub storage_mode: Option<StorageMode>,
    /// Delete downloaded content when the handle is released
    pub remove_after: bool,
}

impl StreamRequest {
    pub fn new(
        magnet: MagnetLink,
        selector: impl FileSelector + 'static,
        stream_fn: impl StreamFunction + 'static,
    ) -> Self {
        Self {
            magnet,
            selector: Arc::new(selector),
            stream_fn: Arc::new(stream_fn),
            save_path: None,
            storage_mode: None,
            remove_after: false,
        }
    }

    pub fn with_save_path(mut self, save_path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(save_path.into());
        self
    }

    pub fn with_storage_mode(mut self, storage_mode: StorageMode) -> Self {
        self.storage_mode = Some(storage_mode);
        self
    }

    pub fn remove_after(mut self, remove_after: bool) -> Self {
        self.remove_after = remove_after;
        self
    }
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("magnet", &self.magnet.as_uri())
            .field("save_path", &self.save_path)
            .field("storage_mode", &self.storage_mode)
            .field("remove_after", &self.remove_after)
            .finish_non_exhaustive()
    }
}

/// Result of a run that reached `DONE`.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub file: FileEntry,
    /// Content was complete before the run started
    pub fast_path: bool,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(StreamState::Done.is_terminal());
        assert!(StreamState::Cancelled.is_terminal());
        assert!(StreamState::Failed(FailureReason::MetadataTimeout).is_terminal());
        assert!(!StreamState::CacheFilling.is_terminal());
        assert!(!StreamState::Init.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StreamState::AwaitingMetadata.to_string(), "AWAITING_METADATA");
        assert_eq!(
            StreamState::Failed(FailureReason::CacheFillTimeout).to_string(),
            "FAILED(CacheFillTimeout)"
        );
    }
}
