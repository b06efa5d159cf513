//! Command definitions for the simulated torrent actor.

use tokio::sync::oneshot;

use crate::engine::{Alert, EngineError, FilePriority, StatusSnapshot, TorrentFile};

/// Commands that can be sent to one simulated torrent actor.
///
/// Each command carries its own response channel, so the actor owns all
/// torrent state and no locks are shared with callers.
pub enum SimulatedCommand {
    HasMetadata {
        responder: oneshot::Sender<bool>,
    },
    IsFinished {
        responder: oneshot::Sender<bool>,
    },
    Status {
        responder: oneshot::Sender<StatusSnapshot>,
    },
    SetSequential {
        enabled: bool,
        responder: oneshot::Sender<()>,
    },
    Files {
        responder: oneshot::Sender<Result<Vec<TorrentFile>, EngineError>>,
    },
    FileProgress {
        responder: oneshot::Sender<Vec<u64>>,
    },
    FilePriorities {
        responder: oneshot::Sender<Vec<FilePriority>>,
    },
    SetFilePriorities {
        priorities: Vec<(usize, FilePriority)>,
        responder: oneshot::Sender<Result<(), EngineError>>,
    },
    PopAlert {
        responder: oneshot::Sender<Option<Alert>>,
    },
    /// Every committed priority vector, oldest first.
    PriorityHistory {
        responder: oneshot::Sender<Vec<Vec<FilePriority>>>,
    },
    /// Stop the actor, optionally deleting materialized content.
    Shutdown {
        delete_files: bool,
        responder: oneshot::Sender<()>,
    },
}
