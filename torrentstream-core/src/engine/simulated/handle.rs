//! Handle for communicating with a simulated torrent actor.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::commands::SimulatedCommand;
use crate::engine::{
    Alert, EngineError, FilePriority, InfoHash, StatusSnapshot, TorrentFile, TorrentHandle,
};

/// Handle for one simulated download.
///
/// Cheap to clone; every clone talks to the same actor. Once the actor has
/// been shut down all calls return `EngineError::EngineShutdown`.
#[derive(Clone)]
pub struct SimulatedHandle {
    info_hash: InfoHash,
    sender: mpsc::Sender<SimulatedCommand>,
}

impl SimulatedHandle {
    pub(super) fn new(info_hash: InfoHash, sender: mpsc::Sender<SimulatedCommand>) -> Self {
        Self { info_hash, sender }
    }

    /// Sends a command built around a fresh response channel and awaits the reply.
    pub(super) async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SimulatedCommand,
    ) -> Result<T, EngineError> {
        let (responder, rx) = oneshot::channel();

        self.sender
            .send(command(responder))
            .await
            .map_err(|_| EngineError::EngineShutdown)?;

        rx.await.map_err(|_| EngineError::EngineShutdown)
    }

    /// Every committed priority vector, oldest first.
    pub async fn priority_history(&self) -> Result<Vec<Vec<FilePriority>>, EngineError> {
        self.request(|responder| SimulatedCommand::PriorityHistory { responder })
            .await
    }

    pub(super) async fn shutdown(&self, delete_files: bool) -> Result<(), EngineError> {
        self.request(|responder| SimulatedCommand::Shutdown {
            delete_files,
            responder,
        })
        .await
    }
}

#[async_trait]
impl TorrentHandle for SimulatedHandle {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    async fn has_metadata(&self) -> Result<bool, EngineError> {
        self.request(|responder| SimulatedCommand::HasMetadata { responder })
            .await
    }

    async fn is_finished(&self) -> Result<bool, EngineError> {
        self.request(|responder| SimulatedCommand::IsFinished { responder })
            .await
    }

    async fn status(&self) -> Result<StatusSnapshot, EngineError> {
        self.request(|responder| SimulatedCommand::Status { responder })
            .await
    }

    async fn set_sequential(&self, enabled: bool) -> Result<(), EngineError> {
        self.request(|responder| SimulatedCommand::SetSequential { enabled, responder })
            .await
    }

    async fn files(&self) -> Result<Vec<TorrentFile>, EngineError> {
        self.request(|responder| SimulatedCommand::Files { responder })
            .await?
    }

    async fn file_progress(&self) -> Result<Vec<u64>, EngineError> {
        self.request(|responder| SimulatedCommand::FileProgress { responder })
            .await
    }

    async fn file_priorities(&self) -> Result<Vec<FilePriority>, EngineError> {
        self.request(|responder| SimulatedCommand::FilePriorities { responder })
            .await
    }

    async fn set_file_priorities(
        &self,
        priorities: &[(usize, FilePriority)],
    ) -> Result<(), EngineError> {
        let priorities = priorities.to_vec();
        self.request(|responder| SimulatedCommand::SetFilePriorities {
            priorities,
            responder,
        })
        .await?
    }

    async fn pop_alert(&self) -> Result<Option<Alert>, EngineError> {
        self.request(|responder| SimulatedCommand::PopAlert { responder })
            .await
    }
}
