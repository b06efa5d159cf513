//! File catalog over a torrent handle
//!
//! Projects the engine's file list into [`FileEntry`] values. The list is
//! materialized once, after metadata is available, and reused for the rest
//! of the run so that file indices used for priority assignment never drift.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::engine::{EngineError, TorrentHandle};

/// Media family guessed from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Other,
}

impl MediaKind {
    /// Classifies a path by its guessed MIME type.
    pub fn from_path(path: &str) -> Self {
        let Some(mime) = mime_guess::from_path(path).first() else {
            return Self::Other;
        };

        match mime.type_().as_str() {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "image" => Self::Image,
            _ => Self::Other,
        }
    }

    pub fn is_media(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// One file within a torrent's content set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    index: usize,
    path: String,
    size: u64,
    kind: MediaKind,
}

impl FileEntry {
    pub fn new(index: usize, path: impl Into<String>, size: u64) -> Self {
        let path = path.into();
        let kind = MediaKind::from_path(&path);
        Self {
            index,
            path,
            size,
            kind,
        }
    }

    /// Engine-internal index of the file.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Path relative to the torrent's save path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// True for audio, video and image files whose path contains none of
    /// `ignore` (compared case-insensitively).
    pub fn is_media(&self, ignore: &[String]) -> bool {
        if !self.kind.is_media() {
            return false;
        }
        let path = self.path.to_lowercase();
        !ignore
            .iter()
            .any(|pattern| path.contains(&pattern.to_lowercase()))
    }

    /// Completion percentage for `completed_bytes` of this file.
    ///
    /// Empty files count as complete.
    pub fn completed_percent(&self, completed_bytes: u64) -> f64 {
        if self.size == 0 {
            return 100.0;
        }
        completed_bytes.min(self.size) as f64 / self.size as f64 * 100.0
    }

    /// Location of the file below `save_path`.
    pub fn local_path(&self, save_path: &Path) -> std::path::PathBuf {
        save_path.join(&self.path)
    }
}

/// Read-through, memoized view of a handle's files.
pub struct FileCatalog {
    handle: Arc<dyn TorrentHandle>,
    files: OnceCell<Arc<[FileEntry]>>,
}

impl FileCatalog {
    pub fn new(handle: Arc<dyn TorrentHandle>) -> Self {
        Self {
            handle,
            files: OnceCell::new(),
        }
    }

    /// Ordered file list, materialized on first successful call.
    ///
    /// # Errors
    /// - `EngineError::MetadataUnavailable` - Metadata has not arrived yet
    pub async fn files(&self) -> Result<Arc<[FileEntry]>, EngineError> {
        self.files
            .get_or_try_init(|| async {
                let files = self.handle.files().await?;
                tracing::debug!(
                    "Catalogued {} files for {}",
                    files.len(),
                    self.handle.info_hash()
                );
                Ok(files
                    .into_iter()
                    .enumerate()
                    .map(|(index, file)| FileEntry::new(index, file.path, file.size))
                    .collect())
            })
            .await
            .cloned()
    }

    /// Completed bytes of `entry` as currently reported by the engine.
    ///
    /// # Errors
    /// - `EngineError::FileIndexOutOfRange` - Entry not part of this torrent
    pub async fn completed_bytes(&self, entry: &FileEntry) -> Result<u64, EngineError> {
        let progress = self.handle.file_progress().await?;
        progress
            .get(entry.index())
            .copied()
            .ok_or(EngineError::FileIndexOutOfRange {
                index: entry.index(),
                file_count: progress.len(),
            })
    }

    pub async fn completed_percent(&self, entry: &FileEntry) -> Result<f64, EngineError> {
        Ok(entry.completed_percent(self.completed_bytes(entry).await?))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{
        AddTorrentParams, MagnetLink, SimulatedEngine, SimulatedFile, SwarmProfile, TorrentEngine,
    };

    #[test]
    fn test_media_classification() {
        assert_eq!(MediaKind::from_path("movie.mkv"), MediaKind::Video);
        assert_eq!(MediaKind::from_path("Movie.MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_path("track.flac"), MediaKind::Audio);
        assert_eq!(MediaKind::from_path("cover.jpg"), MediaKind::Image);
        assert_eq!(MediaKind::from_path("info.nfo"), MediaKind::Other);
        assert_eq!(MediaKind::from_path("README"), MediaKind::Other);
    }

    #[test]
    fn test_is_media_honours_ignore_list() {
        let ignore = vec!["sample".to_string()];
        assert!(FileEntry::new(0, "Show/Episode.mkv", 10).is_media(&ignore));
        assert!(!FileEntry::new(1, "Show/SAMPLE-Episode.mkv", 10).is_media(&ignore));
        assert!(!FileEntry::new(2, "Show/episode.srt", 10).is_media(&ignore));
        assert!(FileEntry::new(3, "Show/sample.mkv", 10).is_media(&[]));
    }

    #[test]
    fn test_completed_percent() {
        let entry = FileEntry::new(0, "movie.mkv", 1000);
        assert_eq!(entry.completed_percent(0), 0.0);
        assert_eq!(entry.completed_percent(50), 5.0);
        assert_eq!(entry.completed_percent(5000), 100.0);
        assert_eq!(FileEntry::new(1, "empty.mkv", 0).completed_percent(0), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_requires_metadata_then_memoizes() {
        let engine = SimulatedEngine::new(
            EngineConfig::default(),
            SwarmProfile {
                tick: Duration::from_millis(100),
                metadata_after_ticks: Some(1),
                bytes_per_tick: 10,
                ..SwarmProfile::default()
            },
        );
        let magnet =
            MagnetLink::parse("magnet:?xt=urn:btih:89abcdef0123456789abcdef0123456789abcdef")
                .unwrap();
        engine.register_content(
            magnet.info_hash(),
            vec![SimulatedFile::new("a.mkv", 100), SimulatedFile::new("b.mkv", 100)],
        );
        let dir = tempfile::tempdir().unwrap();
        let handle = engine
            .add_torrent(&magnet, AddTorrentParams::new(dir.path().to_path_buf()))
            .await
            .unwrap();
        let catalog = FileCatalog::new(handle);

        assert!(matches!(
            catalog.files().await,
            Err(EngineError::MetadataUnavailable { .. })
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;

        let first = catalog.files().await.unwrap();
        let second = catalog.files().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first[1], FileEntry::new(1, "b.mkv", 100));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(catalog.completed_bytes(&first[0]).await.unwrap() > 0);

        let foreign = FileEntry::new(9, "c.mkv", 1);
        assert!(matches!(
            catalog.completed_bytes(&foreign).await,
            Err(EngineError::FileIndexOutOfRange { index: 9, .. })
        ));
    }
}
