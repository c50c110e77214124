use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::fs::FileType;
use std::path::{Path, PathBuf};

/// Bucket name used for files without an extension
pub const NO_EXTENSION: &str = "no_extension";

/// A regular file discovered in the source tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    pub path: PathBuf,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Final path component, used unchanged as the destination file name
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Bucket this entry lands in
    pub fn bucket(&self, lowercase: bool) -> ExtensionBucket {
        ExtensionBucket::for_path(&self.path, lowercase)
    }
}

/// Destination subdirectory named after a file extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionBucket(String);

impl ExtensionBucket {
    /// Derive the bucket from the last dot-suffix of the file name.
    ///
    /// Dotfiles (`.bashrc`) and names with a trailing dot (`notes.`) have no
    /// extension and map to [`NO_EXTENSION`].
    pub fn for_path(path: &Path, lowercase: bool) -> Self {
        match path
            .extension()
            .map(|ext| ext.to_string_lossy())
            .filter(|ext| !ext.is_empty())
        {
            Some(ext) if lowercase => Self(ext.to_lowercase()),
            Some(ext) => Self(ext.into_owned()),
            None => Self::no_extension(),
        }
    }

    pub fn no_extension() -> Self {
        Self(NO_EXTENSION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<destination_root>/<bucket>`
    pub fn directory_in(&self, destination_root: &Path) -> PathBuf {
        destination_root.join(&self.0)
    }
}

impl fmt::Display for ExtensionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How symbolic links met during traversal are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymlinkPolicy {
    /// Every symlink is a file entry; never recursed into
    #[default]
    AsFile,
    /// Symlinks are ignored and not counted
    Skip,
    /// Symlinked directories are recursed into, guarded against cycles
    Follow,
}

/// What the walker does with a single directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Ignored,
}

/// Classify an entry from its `symlink_metadata` file type.
///
/// `target_is_dir` is only consulted for symlinks under [`SymlinkPolicy::Follow`]
/// and should report whether the link resolves to a directory.
pub fn classify_entry(
    file_type: FileType,
    policy: SymlinkPolicy,
    target_is_dir: impl FnOnce() -> Option<bool>,
) -> EntryKind {
    if file_type.is_symlink() {
        return match policy {
            SymlinkPolicy::AsFile => EntryKind::File,
            SymlinkPolicy::Skip => EntryKind::Ignored,
            SymlinkPolicy::Follow => match target_is_dir() {
                Some(true) => EntryKind::Directory,
                Some(false) => EntryKind::File,
                // dangling
                None => EntryKind::Ignored,
            },
        };
    }

    if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_from_simple_extension() {
        let bucket = ExtensionBucket::for_path(Path::new("src/a.txt"), false);
        assert_eq!(bucket.as_str(), "txt");
    }

    #[test]
    fn test_bucket_uses_last_suffix() {
        let bucket = ExtensionBucket::for_path(Path::new("archive.tar.gz"), false);
        assert_eq!(bucket.as_str(), "gz");
    }

    #[test]
    fn test_bucket_preserves_case_by_default() {
        let bucket = ExtensionBucket::for_path(Path::new("IMG_0001.JPG"), false);
        assert_eq!(bucket.as_str(), "JPG");

        let folded = ExtensionBucket::for_path(Path::new("IMG_0001.JPG"), true);
        assert_eq!(folded.as_str(), "jpg");
    }

    #[test]
    fn test_bucket_without_extension() {
        for name in ["c", "Makefile", ".bashrc", "notes."] {
            let bucket = ExtensionBucket::for_path(Path::new(name), false);
            assert_eq!(bucket.as_str(), NO_EXTENSION, "name: {}", name);
        }
    }

    #[test]
    fn test_bucket_directory_in_root() {
        let bucket = ExtensionBucket::for_path(Path::new("x.rs"), false);
        assert_eq!(bucket.directory_in(Path::new("out")), Path::new("out").join("rs"));
    }

    #[test]
    fn test_classify_regular_entries() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let dir_type = std::fs::symlink_metadata(dir.path()).unwrap().file_type();
        let file_type = std::fs::symlink_metadata(&file).unwrap().file_type();

        assert_eq!(
            classify_entry(dir_type, SymlinkPolicy::AsFile, || None),
            EntryKind::Directory
        );
        assert_eq!(
            classify_entry(file_type, SymlinkPolicy::Skip, || None),
            EntryKind::File
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_symlink_by_policy() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let link_type = std::fs::symlink_metadata(&link).unwrap().file_type();

        assert_eq!(
            classify_entry(link_type, SymlinkPolicy::AsFile, || Some(true)),
            EntryKind::File
        );
        assert_eq!(
            classify_entry(link_type, SymlinkPolicy::Skip, || Some(true)),
            EntryKind::Ignored
        );
        assert_eq!(
            classify_entry(link_type, SymlinkPolicy::Follow, || Some(true)),
            EntryKind::Directory
        );
        assert_eq!(
            classify_entry(link_type, SymlinkPolicy::Follow, || None),
            EntryKind::Ignored
        );
    }
}
