//! Handles to a running playback run and the resources it holds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{StreamError, StreamOutcome, StreamProgress, StreamState};
use crate::catalog::FileEntry;
use crate::engine::{EngineError, InfoHash, TorrentEngine};

/// Directory a run downloads into.
pub(crate) enum SaveDir {
    /// Created for this run
    Temporary(TempDir),
    /// Supplied by the caller; never removed as a whole
    Provided(PathBuf),
}

impl SaveDir {
    /// Creates a fresh temporary directory, below `root` when given.
    pub(crate) fn temporary(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("torrentstream-");

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self::Temporary(dir))
    }

    pub(crate) fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Provided(path) => path,
        }
    }

    async fn finish(self, purge: bool) {
        match self {
            Self::Temporary(dir) if purge => {
                let path = dir.path().to_path_buf();
                match tokio::task::spawn_blocking(move || dir.close()).await {
                    Ok(Ok(())) => tracing::debug!("Removed {}", path.display()),
                    Ok(Err(e)) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
                    Err(e) => tracing::warn!("Removal of {} did not finish: {}", path.display(), e),
                }
            }
            Self::Temporary(dir) => {
                let path = dir.keep();
                tracing::info!("Downloaded content kept in {}", path.display());
            }
            Self::Provided(_) => {}
        }
    }
}

/// Engine-side resources of one run, released at most once.
pub(crate) struct StreamResources {
    engine: Arc<dyn TorrentEngine>,
    info_hash: InfoHash,
    remove_after: bool,
    save_path: PathBuf,
    /// `None` once the handle has left the session
    save_dir: Mutex<Option<SaveDir>>,
}

impl StreamResources {
    pub(crate) fn new(
        engine: Arc<dyn TorrentEngine>,
        info_hash: InfoHash,
        remove_after: bool,
        save_dir: SaveDir,
    ) -> Self {
        Self {
            engine,
            info_hash,
            remove_after,
            save_path: save_dir.path().to_path_buf(),
            save_dir: Mutex::new(Some(save_dir)),
        }
    }

    /// Removes the handle from the session, purging content when the run
    /// was configured with `remove_after`.
    ///
    /// Returns false when an earlier call already released. A failed
    /// removal leaves the handle and its content untouched so the call can
    /// be retried.
    pub(crate) async fn release(&self) -> Result<bool, EngineError> {
        let mut save_dir = self.save_dir.lock().await;
        if save_dir.is_none() {
            return Ok(false);
        }

        match self
            .engine
            .remove_torrent(self.info_hash, self.remove_after)
            .await
        {
            Ok(()) | Err(EngineError::TorrentNotFound { .. }) => {}
            Err(e) => {
                tracing::warn!("Failed to remove {} from the session: {}", self.info_hash, e);
                return Err(e);
            }
        }

        if let Some(dir) = save_dir.take() {
            dir.finish(self.remove_after).await;
        }
        tracing::info!(
            "Released {}{}",
            self.info_hash,
            if self.remove_after { " and purged its content" } else { "" }
        );
        Ok(true)
    }
}

/// Cloneable view of a run: state, progress and cancellation.
#[derive(Clone)]
pub struct StreamController {
    info_hash: InfoHash,
    state: watch::Receiver<StreamState>,
    progress: watch::Receiver<Option<StreamProgress>>,
    selected: watch::Receiver<Option<FileEntry>>,
    cancel: CancellationToken,
    resources: Arc<StreamResources>,
}

impl StreamController {
    pub(crate) fn new(
        info_hash: InfoHash,
        state: watch::Receiver<StreamState>,
        progress: watch::Receiver<Option<StreamProgress>>,
        selected: watch::Receiver<Option<FileEntry>>,
        cancel: CancellationToken,
        resources: Arc<StreamResources>,
    ) -> Self {
        Self {
            info_hash,
            state,
            progress,
            selected,
            cancel,
            resources,
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn state(&self) -> StreamState {
        self.state.borrow().clone()
    }

    /// Latest report of the monitor.
    pub fn progress(&self) -> Option<StreamProgress> {
        self.progress.borrow().clone()
    }

    /// Receiver notified on every monitor report.
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<StreamProgress>> {
        self.progress.clone()
    }

    pub fn selected_file(&self) -> Option<FileEntry> {
        self.selected.borrow().clone()
    }

    /// Directory the torrent's content is written to.
    pub fn save_path(&self) -> &Path {
        &self.resources.save_path
    }

    /// Waits until the state satisfies `predicate` or the run task is gone,
    /// and returns the state observed last.
    pub async fn wait_for(&self, predicate: impl FnMut(&StreamState) -> bool) -> StreamState {
        let mut state = self.state.clone();
        let observed = state.wait_for(predicate).await.map(|current| (*current).clone());
        observed.unwrap_or_else(|_| state.borrow().clone())
    }

    /// Waits for `DONE`, `FAILED` or `CANCELLED`.
    pub async fn wait_terminal(&self) -> StreamState {
        self.wait_for(StreamState::is_terminal).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the run from any state and releases its handle.
    ///
    /// Stops the monitor, any in-flight wait and the stream function. On an
    /// already terminal run only the release happens.
    ///
    /// # Errors
    /// - `StreamError::Engine` - Handle could not be removed from the session
    pub async fn cancel(&self) -> Result<StreamState, StreamError> {
        tracing::info!("Cancelling stream {}", self.info_hash);
        self.cancel.cancel();
        let state = self.wait_terminal().await;
        self.resources.release().await?;
        Ok(state)
    }

    /// Releases the handle without cancelling; used after `FAILED`.
    ///
    /// # Errors
    /// - `EngineError` - Engine refused the removal
    pub async fn release(&self) -> Result<bool, EngineError> {
        self.resources.release().await
    }

    /// True when both controllers observe the same run.
    pub fn is_same_run(&self, other: &StreamController) -> bool {
        Arc::ptr_eq(&self.resources, &other.resources)
    }
}

impl std::fmt::Debug for StreamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamController")
            .field("info_hash", &self.info_hash)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// A started run: its controller plus the task driving it.
#[derive(Debug)]
pub struct ActiveStream {
    controller: StreamController,
    task: JoinHandle<Result<StreamOutcome, StreamError>>,
}

impl ActiveStream {
    pub(crate) fn new(
        controller: StreamController,
        task: JoinHandle<Result<StreamOutcome, StreamError>>,
    ) -> Self {
        Self { controller, task }
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn info_hash(&self) -> InfoHash {
        self.controller.info_hash()
    }

    /// Waits for the run to end and returns its result.
    ///
    /// # Errors
    /// - Any `StreamError` that ended the run
    /// - `StreamError::Aborted` - Run task panicked or was aborted
    pub async fn wait(self) -> Result<StreamOutcome, StreamError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(StreamError::Aborted {
                reason: e.to_string(),
            }),
        }
    }

    /// Detaches the run task, keeping only the controller.
    pub fn detach(self) -> StreamController {
        self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temporary_save_dir_kept_or_purged() {
        let root = tempfile::tempdir().unwrap();

        let kept = SaveDir::temporary(Some(root.path())).unwrap();
        let kept_path = kept.path().to_path_buf();
        assert!(kept_path.starts_with(root.path()));
        kept.finish(false).await;
        assert!(kept_path.exists());

        let purged = SaveDir::temporary(Some(root.path())).unwrap();
        let purged_path = purged.path().to_path_buf();
        std::fs::write(purged_path.join("partial.mkv"), b"data").unwrap();
        purged.finish(true).await;
        assert!(!purged_path.exists());
    }

    #[tokio::test]
    async fn test_provided_save_dir_is_never_removed() {
        let root = tempfile::tempdir().unwrap();
        SaveDir::Provided(root.path().to_path_buf()).finish(true).await;
        assert!(root.path().exists());
    }
}
