use crate::models::{classify_entry, CollisionPolicy, EntryKind, SymlinkPolicy};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Entries of a single directory, split by how the walker treats them
#[derive(Debug, Default)]
pub struct Listing {
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// List one directory level without recursing.
///
/// Entries that vanish or cannot be inspected between `read_dir` and
/// classification are dropped with a debug line; only failure to open the
/// directory itself is an error.
pub fn list_directory<P: AsRef<Path>>(directory: P, policy: SymlinkPolicy) -> Result<Listing> {
    let dir_path = directory.as_ref();

    let entries = fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read directory: {:?}", dir_path))?;

    let mut listing = Listing::default();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry in {:?}: {}", dir_path, e);
                continue;
            }
        };

        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                debug!("Skipping {:?}: {}", path, e);
                continue;
            }
        };

        let kind = classify_entry(file_type, policy, || {
            fs::metadata(&path).ok().map(|meta| meta.is_dir())
        });

        match kind {
            EntryKind::Directory => listing.directories.push(path),
            EntryKind::File => listing.files.push(path),
            EntryKind::Ignored => debug!("Ignoring non-regular entry {:?}", path),
        }
    }

    Ok(listing)
}

/// Tracks directories already entered so that followed symlinks cannot loop,
/// and keeps traversal out of an excluded directory (an output tree nested
/// inside the source).
///
/// Canonicalization only happens under [`SymlinkPolicy::Follow`]; other
/// policies never recurse through links, so every directory is visited once
/// and excluded paths match by their joined form.
#[derive(Debug)]
pub struct VisitedDirs {
    policy: SymlinkPolicy,
    seen: HashSet<PathBuf>,
    exclude: Option<PathBuf>,
    exclude_canonical: Option<PathBuf>,
}

impl VisitedDirs {
    pub fn new(policy: SymlinkPolicy) -> Self {
        Self {
            policy,
            seen: HashSet::new(),
            exclude: None,
            exclude_canonical: None,
        }
    }

    /// Never enter `directory` (given as a path under the walk root)
    pub fn excluding(mut self, directory: Option<PathBuf>) -> Self {
        self.exclude_canonical = directory
            .as_deref()
            .and_then(|dir| fs::canonicalize(dir).ok());
        self.exclude = directory;
        self
    }

    /// Returns `false` if the directory must not be entered
    pub fn first_visit(&mut self, directory: &Path) -> bool {
        if self.exclude.as_deref() == Some(directory) {
            debug!("Not descending into output directory {:?}", directory);
            return false;
        }

        if self.policy != SymlinkPolicy::Follow {
            return true;
        }

        match fs::canonicalize(directory) {
            Ok(canonical) => {
                self.exclude_canonical.as_ref() != Some(&canonical) && self.seen.insert(canonical)
            }
            // let the listing report the real error
            Err(_) => true,
        }
    }
}

/// Count every file the walker would emit under `root`.
///
/// Uses the same classification and exclusions as the walker so the progress
/// total matches the number of dispatched files. Unreadable subdirectories
/// are skipped; an unreadable root is an error.
pub fn count_files<P: AsRef<Path>>(
    root: P,
    policy: SymlinkPolicy,
    exclude: Option<PathBuf>,
) -> Result<u64> {
    let root = root.as_ref();
    let mut visited = VisitedDirs::new(policy).excluding(exclude);
    visited.first_visit(root);

    let mut pending = vec![root.to_path_buf()];
    let mut total = 0u64;
    let mut is_root = true;

    while let Some(directory) = pending.pop() {
        let listing = match list_directory(&directory, policy) {
            Ok(listing) => listing,
            Err(e) if is_root => return Err(e),
            Err(e) => {
                warn!("Count skipped {:?}: {:#}", directory, e);
                continue;
            }
        };
        is_root = false;

        total += listing.files.len() as u64;
        pending.extend(
            listing
                .directories
                .into_iter()
                .filter(|dir| visited.first_visit(dir)),
        );
    }

    Ok(total)
}

/// Create a directory and its parents; succeeds if it already exists,
/// including when another task creates it concurrently
pub async fn ensure_directory<P: AsRef<Path>>(directory: P) -> Result<()> {
    let dir_path = directory.as_ref();
    tokio::fs::create_dir_all(dir_path)
        .await
        .with_context(|| format!("Failed to create directory: {:?}", dir_path))
}

/// What [`copy_file_safe`] did with one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// The destination exists and the collision policy keeps it
    KeptExisting,
    /// The destination is the source itself, under another spelling or a
    /// hard link; copying would truncate it
    SameFile,
}

/// Copy file from source to destination.
///
/// A destination that turns out to be the source file is never written.
/// Failing to inspect an existing destination is an error, not a copy.
pub async fn copy_file_safe<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    destination: Q,
    collision: CollisionPolicy,
) -> Result<CopyOutcome> {
    let src_path = source.as_ref();
    let dest_path = destination.as_ref();

    let exists = tokio::fs::try_exists(dest_path)
        .await
        .with_context(|| format!("Failed to check destination: {:?}", dest_path))?;

    if exists {
        if is_same_file(src_path, dest_path).await? {
            return Ok(CopyOutcome::SameFile);
        }
        if collision == CollisionPolicy::Skip {
            return Ok(CopyOutcome::KeptExisting);
        }
    }

    tokio::fs::copy(src_path, dest_path)
        .await
        .with_context(|| format!("Failed to copy file from {:?} to {:?}", src_path, dest_path))?;

    Ok(CopyOutcome::Copied)
}

/// Whether both paths name the same file (same device and inode)
#[cfg(unix)]
async fn is_same_file(source: &Path, destination: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let src_meta = tokio::fs::metadata(source)
        .await
        .with_context(|| format!("Failed to read metadata: {:?}", source))?;
    let dest_meta = match tokio::fs::metadata(destination).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read metadata: {:?}", destination))
        }
    };

    Ok(src_meta.dev() == dest_meta.dev() && src_meta.ino() == dest_meta.ino())
}

/// Whether both paths resolve to the same canonical path
#[cfg(not(unix))]
async fn is_same_file(source: &Path, destination: &Path) -> Result<bool> {
    let dest_canonical = match tokio::fs::canonicalize(destination).await {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to resolve path: {:?}", destination))
        }
    };
    let src_canonical = tokio::fs::canonicalize(source)
        .await
        .with_context(|| format!("Failed to resolve path: {:?}", source))?;

    Ok(src_canonical == dest_canonical)
}
