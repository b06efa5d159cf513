//! Exclusive priority scheduling
//!
//! Focuses the engine on one file: sequential mode on, the selected file at
//! maximum priority, every other file skipped. The whole vector is committed
//! in a single engine call so the engine never observes a mixed state.

use crate::catalog::FileEntry;
use crate::engine::{EngineError, FilePriority, TorrentHandle};

/// Complete priority assignment for one torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityPlan {
    priorities: Vec<FilePriority>,
}

impl PriorityPlan {
    /// Plan giving `selected` maximum priority and skipping everything else.
    ///
    /// Input ordering does not matter; the plan is indexed by
    /// [`FileEntry::index`].
    pub fn exclusive(files: &[FileEntry], selected: &FileEntry) -> Self {
        let len = files
            .iter()
            .map(|file| file.index() + 1)
            .max()
            .unwrap_or(0)
            .max(selected.index() + 1);

        let mut priorities = vec![FilePriority::SKIP; len];
        priorities[selected.index()] = FilePriority::MAXIMUM;
        Self { priorities }
    }

    /// `(file index, priority)` pairs in index order.
    pub fn entries(&self) -> Vec<(usize, FilePriority)> {
        self.priorities.iter().copied().enumerate().collect()
    }

    pub fn priorities(&self) -> &[FilePriority] {
        &self.priorities
    }

    /// Number of files with non-zero priority.
    pub fn active_count(&self) -> usize {
        self.priorities
            .iter()
            .filter(|priority| priority.is_wanted())
            .count()
    }
}

/// Switches `handle` to sequential mode and commits the exclusive plan for
/// `selected`.
///
/// Re-applying the same selection yields the same priority vector.
///
/// # Errors
/// - `EngineError::MetadataUnavailable` - Handle has no metadata yet
/// - `EngineError::FileIndexOutOfRange` - Selection outside the torrent
pub async fn apply_exclusive(
    handle: &dyn TorrentHandle,
    files: &[FileEntry],
    selected: &FileEntry,
) -> Result<PriorityPlan, EngineError> {
    let plan = PriorityPlan::exclusive(files, selected);

    handle.set_sequential(true).await?;
    handle.set_file_priorities(&plan.entries()).await?;

    tracing::info!(
        "Prioritized {} (index {}), {} other files skipped",
        selected.path(),
        selected.index(),
        plan.priorities().len() - plan.active_count()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{
        AddTorrentParams, MagnetLink, SimulatedEngine, SimulatedFile, SwarmProfile, TorrentEngine,
    };

    fn entries(sizes: &[u64]) -> Vec<FileEntry> {
        sizes
            .iter()
            .enumerate()
            .map(|(index, size)| FileEntry::new(index, format!("file-{index}.mkv"), *size))
            .collect()
    }

    #[test]
    fn test_exclusive_plan_scenario() {
        let files = vec![
            FileEntry::new(0, "sample.mkv", 100),
            FileEntry::new(1, "movie.mkv", 1000),
        ];
        let plan = PriorityPlan::exclusive(&files, &files[1]);
        assert_eq!(plan.priorities(), &[FilePriority::SKIP, FilePriority::MAXIMUM]);
        assert_eq!(plan.active_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_exactly_one_active_file(
            sizes in prop::collection::vec(0u64..10_000, 1..40),
            pick in any::<prop::sample::Index>(),
            reverse in any::<bool>(),
        ) {
            let mut files = entries(&sizes);
            let selected = files[pick.index(files.len())].clone();
            if reverse {
                files.reverse();
            }

            let plan = PriorityPlan::exclusive(&files, &selected);

            prop_assert_eq!(plan.priorities().len(), sizes.len());
            prop_assert_eq!(plan.active_count(), 1);
            prop_assert_eq!(plan.priorities()[selected.index()], FilePriority::MAXIMUM);
            for (index, priority) in plan.entries() {
                if index != selected.index() {
                    prop_assert_eq!(priority, FilePriority::SKIP);
                }
            }
        }

        #[test]
        fn prop_exclusive_is_idempotent(
            sizes in prop::collection::vec(0u64..10_000, 1..40),
            pick in any::<prop::sample::Index>(),
        ) {
            let files = entries(&sizes);
            let selected = &files[pick.index(files.len())];
            prop_assert_eq!(
                PriorityPlan::exclusive(&files, selected),
                PriorityPlan::exclusive(&files, selected)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_exclusive_commits_one_batch() {
        let engine = SimulatedEngine::new(
            EngineConfig::default(),
            SwarmProfile {
                tick: Duration::from_millis(100),
                metadata_after_ticks: Some(0),
                bytes_per_tick: 0,
                ..SwarmProfile::default()
            },
        );
        let magnet =
            MagnetLink::parse("magnet:?xt=urn:btih:fedcba9876543210fedcba9876543210fedcba98")
                .unwrap();
        engine.register_content(
            magnet.info_hash(),
            vec![
                SimulatedFile::new("sample.mkv", 100),
                SimulatedFile::new("movie.mkv", 1000),
                SimulatedFile::new("movie.nfo", 10),
            ],
        );
        let dir = tempfile::tempdir().unwrap();
        let handle = engine
            .add_torrent(&magnet, AddTorrentParams::new(dir.path().to_path_buf()))
            .await
            .unwrap();

        let files: Vec<FileEntry> = handle
            .files()
            .await
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(index, file)| FileEntry::new(index, file.path, file.size))
            .collect();

        apply_exclusive(handle.as_ref(), &files, &files[1]).await.unwrap();
        apply_exclusive(handle.as_ref(), &files, &files[1]).await.unwrap();

        let expected = vec![FilePriority::SKIP, FilePriority::MAXIMUM, FilePriority::SKIP];
        assert_eq!(handle.file_priorities().await.unwrap(), expected);
        assert!(handle.status().await.unwrap().sequential);

        let history = engine.priority_history(magnet.info_hash()).await.unwrap();
        assert_eq!(history, vec![expected.clone(), expected]);
    }
}
