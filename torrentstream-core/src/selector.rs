//! Playable file selection
//!
//! A [`FileSelector`] looks at the whole ordered file list and picks at most
//! one entry. Closures of type `Fn(&[FileEntry]) -> Option<FileEntry>` are
//! selectors too.

use crate::catalog::FileEntry;
use crate::orchestrator::StreamError;

/// Picks the single file to stream.
pub trait FileSelector: Send + Sync {
    fn select(&self, files: &[FileEntry]) -> Option<FileEntry>;
}

impl<F> FileSelector for F
where
    F: Fn(&[FileEntry]) -> Option<FileEntry> + Send + Sync,
{
    fn select(&self, files: &[FileEntry]) -> Option<FileEntry> {
        self(files)
    }
}

/// First media file whose path avoids every ignore pattern.
#[derive(Debug, Clone)]
pub struct FirstMedia {
    ignore: Vec<String>,
}

impl FirstMedia {
    pub fn new(ignore: Vec<String>) -> Self {
        Self { ignore }
    }
}

impl FileSelector for FirstMedia {
    fn select(&self, files: &[FileEntry]) -> Option<FileEntry> {
        files.iter().find(|file| file.is_media(&self.ignore)).cloned()
    }
}

/// Largest media file whose path avoids every ignore pattern.
///
/// Ties go to the lowest index.
#[derive(Debug, Clone)]
pub struct LargestMedia {
    ignore: Vec<String>,
}

impl LargestMedia {
    pub fn new(ignore: Vec<String>) -> Self {
        Self { ignore }
    }
}

impl FileSelector for LargestMedia {
    fn select(&self, files: &[FileEntry]) -> Option<FileEntry> {
        files
            .iter()
            .filter(|file| file.is_media(&self.ignore))
            .fold(None::<&FileEntry>, |best, file| match best {
                Some(best) if best.size() >= file.size() => Some(best),
                _ => Some(file),
            })
            .cloned()
    }
}

/// First file in engine order, regardless of type.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFile;

impl FileSelector for FirstFile {
    fn select(&self, files: &[FileEntry]) -> Option<FileEntry> {
        files.first().cloned()
    }
}

/// Runs `selector` over `files` and enforces "exactly one or fail".
///
/// An entry that is not part of `files` counts as no selection, since its
/// index could not be prioritized.
///
/// # Errors
/// - `StreamError::NoPlayableSource` - Selector matched nothing usable
pub fn select(files: &[FileEntry], selector: &dyn FileSelector) -> Result<FileEntry, StreamError> {
    let Some(selected) = selector.select(files) else {
        return Err(StreamError::NoPlayableSource {
            file_count: files.len(),
        });
    };

    if files.get(selected.index()) != Some(&selected) {
        tracing::warn!(
            "Selector returned {} (index {}) which is not in the file list",
            selected.path(),
            selected.index()
        );
        return Err(StreamError::NoPlayableSource {
            file_count: files.len(),
        });
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<FileEntry> {
        vec![
            FileEntry::new(0, "Movie/sample.mkv", 100),
            FileEntry::new(1, "Movie/movie.mkv", 1000),
            FileEntry::new(2, "Movie/extras.mkv", 1000),
            FileEntry::new(3, "Movie/movie.nfo", 5000),
        ]
    }

    fn ignore() -> Vec<String> {
        vec!["sample".to_string()]
    }

    #[test]
    fn test_largest_media_skips_sample_and_non_media() {
        let files = vec![
            FileEntry::new(0, "sample.mkv", 100),
            FileEntry::new(1, "movie.mkv", 1000),
        ];
        let selected = select(&files, &LargestMedia::new(ignore())).unwrap();
        assert_eq!(selected.path(), "movie.mkv");
    }

    #[test]
    fn test_largest_media_prefers_lowest_index_on_tie() {
        let selected = select(&files(), &LargestMedia::new(ignore())).unwrap();
        assert_eq!(selected.index(), 1);
    }

    #[test]
    fn test_first_media_and_first_file() {
        assert_eq!(select(&files(), &FirstMedia::new(ignore())).unwrap().index(), 1);
        assert_eq!(select(&files(), &FirstMedia::new(Vec::new())).unwrap().index(), 0);
        assert_eq!(select(&files(), &FirstFile).unwrap().index(), 0);
    }

    #[test]
    fn test_closure_selector() {
        let by_name = |files: &[FileEntry]| files.iter().find(|f| f.path().ends_with(".nfo")).cloned();
        assert_eq!(select(&files(), &by_name).unwrap().index(), 3);
    }

    #[test]
    fn test_no_match_is_no_playable_source() {
        let none = |_: &[FileEntry]| None;
        assert!(matches!(
            select(&files(), &none),
            Err(StreamError::NoPlayableSource { file_count: 4 })
        ));
        assert!(matches!(
            select(&[], &FirstFile),
            Err(StreamError::NoPlayableSource { file_count: 0 })
        ));
    }

    #[test]
    fn test_foreign_entry_rejected() {
        let foreign = |_: &[FileEntry]| Some(FileEntry::new(1, "elsewhere.mkv", 1));
        assert!(matches!(
            select(&files(), &foreign),
            Err(StreamError::NoPlayableSource { .. })
        ));
    }
}
