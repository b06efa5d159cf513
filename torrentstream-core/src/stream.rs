//! Stream functions
//!
//! A [`StreamFunction`] consumes the selected file once enough of it is on
//! disk. The orchestrator awaits it jointly with the remaining download and
//! does not care whether it plays, serves or copies the file.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::catalog::FileEntry;
use crate::config::PlayerConfig;
use crate::engine::InfoHash;
use crate::orchestrator::StreamError;

/// Runtime context handed to a stream function.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub info_hash: InfoHash,
    /// Directory the torrent's content is written to
    pub save_path: PathBuf,
    /// Cancelled when the run is cancelled or fails
    pub cancel: CancellationToken,
}

impl StreamContext {
    /// On-disk location of `file`.
    pub fn file_path(&self, file: &FileEntry) -> PathBuf {
        file.local_path(&self.save_path)
    }
}

/// Consumer of the selected file.
#[async_trait]
pub trait StreamFunction: Send + Sync {
    /// Resolves when streaming has completed.
    ///
    /// # Errors
    /// - `StreamError::Playback` - Consumer failed
    async fn stream(&self, ctx: &StreamContext, file: &FileEntry) -> Result<(), StreamError>;
}

/// Stream function that opens the file in an external player.
#[derive(Debug, Clone)]
pub struct PlayerLauncher {
    command: String,
    args: Vec<String>,
}

impl PlayerLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the player against `target` (a path or URL) until it exits.
    ///
    /// The child is killed if `cancel` fires first.
    ///
    /// # Errors
    /// - `StreamError::Playback` - Player could not start or exited unsuccessfully
    /// - `StreamError::Cancelled` - Cancelled while the player was running
    pub async fn launch(&self, target: &str, cancel: &CancellationToken) -> Result<(), StreamError> {
        tracing::info!("Launching {} {}", self.command, target);

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StreamError::Playback {
                reason: format!("failed to start {}: {e}", self.command),
            })?;

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| StreamError::Playback {
                reason: format!("failed to wait for {}: {e}", self.command),
            })?,
            _ = cancel.cancelled() => {
                tracing::debug!("Stopping {} after cancellation", self.command);
                return Err(StreamError::Cancelled);
            }
        };

        if !status.success() {
            return Err(StreamError::Playback {
                reason: format!("{} exited with {status}", self.command),
            });
        }

        tracing::debug!("{} exited cleanly", self.command);
        Ok(())
    }

    fn target(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

#[async_trait]
impl StreamFunction for PlayerLauncher {
    async fn stream(&self, ctx: &StreamContext, file: &FileEntry) -> Result<(), StreamError> {
        let path = ctx.file_path(file);
        self.launch(&Self::target(&path), &ctx.cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> StreamContext {
        StreamContext {
            info_hash: InfoHash::new([1u8; 20]),
            save_path: PathBuf::from("/downloads/run"),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_file_path_joins_save_path() {
        let file = FileEntry::new(0, "Movie/movie.mkv", 10);
        assert_eq!(
            context().file_path(&file),
            PathBuf::from("/downloads/run/Movie/movie.mkv")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_exit_status_is_reported() {
        let file = FileEntry::new(0, "movie.mkv", 10);

        PlayerLauncher::new("true")
            .stream(&context(), &file)
            .await
            .unwrap();

        let result = PlayerLauncher::new("false").stream(&context(), &file).await;
        assert!(matches!(result, Err(StreamError::Playback { .. })));
    }

    #[tokio::test]
    async fn test_missing_player_is_playback_error() {
        let file = FileEntry::new(0, "movie.mkv", 10);
        let result = PlayerLauncher::new("definitely-not-a-player-binary")
            .stream(&context(), &file)
            .await;
        assert!(matches!(result, Err(StreamError::Playback { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_stops_player() {
        let ctx = context();
        let launcher = PlayerLauncher::new("sleep");
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = launcher.launch("30", &ctx.cancel).await;
        assert!(matches!(result, Err(StreamError::Cancelled)));
    }
}
