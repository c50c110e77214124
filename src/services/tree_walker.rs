use crate::error::WalkError;
use crate::models::{FileEntry, SymlinkPolicy};
use crate::utils::{list_directory, Listing, VisitedDirs};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Capacity of the channel between walker and dispatcher
pub const FILE_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for tree traversal
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub symlinks: SymlinkPolicy,
    /// Directory listings allowed in flight at once
    pub listing_concurrency: usize,
    /// Directory under the root that must not be entered
    pub exclude: Option<PathBuf>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            symlinks: SymlinkPolicy::default(),
            listing_concurrency: 16,
            exclude: None,
        }
    }
}

/// A subtree left out because its directory could not be listed
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDir {
    pub path: String,
    pub error: String,
}

/// Totals gathered while walking
#[derive(Debug, Clone, Default, Serialize)]
pub struct WalkSummary {
    pub directories_listed: u64,
    pub files_found: u64,
    pub skipped_dirs: Vec<SkippedDir>,
}

/// Walk `root` and stream every file into `sink` as soon as its directory
/// has been listed.
///
/// Pending directories sit in an explicit queue; at most
/// `listing_concurrency` of them are listed at once on the blocking pool.
/// Sibling order is not preserved. A subdirectory that cannot be listed is
/// logged and skipped; failing to list the root is fatal. If the receiving
/// side goes away the walk stops early and returns what it saw.
pub async fn walk(
    root: &Path,
    options: &WalkOptions,
    sink: mpsc::Sender<FileEntry>,
) -> Result<WalkSummary, WalkError> {
    let mut visited = VisitedDirs::new(options.symlinks).excluding(options.exclude.clone());
    visited.first_visit(root);

    let mut pending = VecDeque::from([root.to_path_buf()]);
    let mut listings: JoinSet<(PathBuf, anyhow::Result<Listing>)> = JoinSet::new();
    let limit = options.listing_concurrency.max(1);
    let mut summary = WalkSummary::default();

    loop {
        while listings.len() < limit {
            let Some(directory) = pending.pop_front() else {
                break;
            };
            let policy = options.symlinks;
            listings.spawn_blocking(move || {
                let listing = list_directory(&directory, policy);
                (directory, listing)
            });
        }

        let Some(joined) = listings.join_next().await else {
            break;
        };
        let (directory, listing) = joined.map_err(|e| WalkError::TaskFailed(e.to_string()))?;

        let listing = match listing {
            Ok(listing) => listing,
            Err(e) if directory == root => {
                return Err(WalkError::RootUnreadable {
                    path: directory,
                    message: format!("{:#}", e),
                });
            }
            Err(e) => {
                warn!("Skipping unreadable directory {}: {:#}", directory.display(), e);
                summary.skipped_dirs.push(SkippedDir {
                    path: directory.to_string_lossy().to_string(),
                    error: format!("{:#}", e),
                });
                continue;
            }
        };

        summary.directories_listed += 1;
        debug!(
            "Listed {}: {} files, {} subdirectories",
            directory.display(),
            listing.files.len(),
            listing.directories.len()
        );

        for path in listing.files {
            summary.files_found += 1;
            if sink.send(FileEntry::new(path)).await.is_err() {
                debug!("File receiver closed, stopping walk");
                return Ok(summary);
            }
        }

        pending.extend(
            listing
                .directories
                .into_iter()
                .filter(|dir| visited.first_visit(dir)),
        );
    }

    info!(
        "Walk finished: {} directories, {} files, {} skipped directories",
        summary.directories_listed,
        summary.files_found,
        summary.skipped_dirs.len()
    );

    Ok(summary)
}

/// Walk `root` to completion and return every file found.
///
/// Same traversal as [`walk`], buffered instead of streamed.
pub async fn collect_files(
    root: &Path,
    options: &WalkOptions,
) -> Result<(Vec<FileEntry>, WalkSummary), WalkError> {
    let (tx, mut rx) = mpsc::channel(FILE_CHANNEL_CAPACITY);

    let collector = async move {
        let mut files = Vec::new();
        while let Some(entry) = rx.recv().await {
            files.push(entry);
        }
        files
    };

    let (summary, files) = tokio::join!(walk(root, options, tx), collector);
    Ok((files, summary?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn build_deep_tree(root: &Path, depth: usize) -> usize {
        let mut dir = root.to_path_buf();
        for level in 0..depth {
            fs::write(dir.join(format!("f{}.txt", level)), b"x").unwrap();
            dir = dir.join(format!("d{}", level));
            fs::create_dir(&dir).unwrap();
        }
        depth
    }

    #[tokio::test]
    async fn test_collect_files_deep_tree() {
        let dir = TempDir::new().unwrap();
        let expected = build_deep_tree(dir.path(), 64);

        let (files, summary) = collect_files(dir.path(), &WalkOptions::default())
            .await
            .unwrap();

        assert_eq!(files.len(), expected);
        assert_eq!(summary.files_found, expected as u64);
        assert_eq!(summary.directories_listed, 65);
        assert!(summary.skipped_dirs.is_empty());
    }

    #[tokio::test]
    async fn test_walk_single_listing_slot() {
        let dir = TempDir::new().unwrap();
        for sub in ["a", "b", "c"] {
            fs::create_dir(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join("x.bin"), b"x").unwrap();
        }

        let options = WalkOptions {
            listing_concurrency: 1,
            ..WalkOptions::default()
        };
        let (files, _) = collect_files(dir.path(), &options).await.unwrap();
        assert_eq!(files.len(), 3);
    }

    #[tokio::test]
    async fn test_walk_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = collect_files(&dir.path().join("gone"), &WalkOptions::default()).await;
        assert!(matches!(result, Err(WalkError::RootUnreadable { .. })));
    }

    #[tokio::test]
    async fn test_walk_skips_excluded_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out").join("b.txt"), b"b").unwrap();

        let options = WalkOptions {
            exclude: Some(dir.path().join("out")),
            ..WalkOptions::default()
        };
        let (files, _) = collect_files(dir.path(), &options).await.unwrap();
        assert_eq!(files, vec![FileEntry::new(dir.path().join("a.txt"))]);
    }

    #[tokio::test]
    async fn test_walk_skips_directory_removed_before_listing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        let doomed = dir.path().join("doomed");
        fs::create_dir(&doomed).unwrap();
        fs::write(doomed.join("c.txt"), b"c").unwrap();

        // one slot: the walker blocks on the second root file and has not
        // queued `doomed` yet
        let (tx, mut rx) = mpsc::channel(1);
        let watcher = tx.clone();
        let root = dir.path().to_path_buf();
        let walker = tokio::spawn(async move {
            let options = WalkOptions {
                listing_concurrency: 1,
                ..WalkOptions::default()
            };
            walk(&root, &options, tx).await
        });

        while watcher.capacity() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        drop(watcher);
        fs::remove_dir_all(&doomed).unwrap();

        let mut received = Vec::new();
        while let Some(entry) = rx.recv().await {
            received.push(entry);
        }
        let summary = walker.await.unwrap().unwrap();

        assert_eq!(received.len(), 2);
        assert_eq!(summary.files_found, 2);
        assert_eq!(summary.skipped_dirs.len(), 1);
        assert_eq!(summary.skipped_dirs[0].path, doomed.to_string_lossy());
    }

    #[tokio::test]
    async fn test_walk_stops_when_receiver_dropped() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("{}.txt", i)), b"x").unwrap();
        }

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let summary = walk(dir.path(), &WalkOptions::default(), tx).await.unwrap();
        assert_eq!(summary.files_found, 1);
    }
}
