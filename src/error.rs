//! Run-level errors.
//!
//! Per-file and per-directory failures never surface here; they are logged
//! and folded into the run report where they happen.

use std::path::PathBuf;
use thiserror::Error;

/// Unrecoverable traversal failures
#[derive(Error, Debug)]
pub enum WalkError {
    /// The root itself could not be listed (missing, vanished mid-run, no permission)
    #[error("cannot read source root '{path}': {message}")]
    RootUnreadable { path: PathBuf, message: String },

    /// A listing task panicked or was cancelled by the runtime
    #[error("traversal task failed: {0}")]
    TaskFailed(String),
}

/// Errors that stop a sort run
#[derive(Error, Debug)]
pub enum SortError {
    #[error("'{0}' is not a directory")]
    SourceNotDirectory(PathBuf),

    #[error("cannot use output directory '{path}': {message}")]
    DestinationUnavailable { path: PathBuf, message: String },

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error("cannot write report '{path}': {message}")]
    Report { path: PathBuf, message: String },
}

impl SortError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            SortError::SourceNotDirectory(_) | SortError::DestinationUnavailable { .. } => 2,
            SortError::Walk(_) => 3,
            SortError::Report { .. } => 1,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.exit_code() == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(SortError::SourceNotDirectory(PathBuf::from("x")).exit_code(), 2);
        assert_eq!(
            SortError::from(WalkError::TaskFailed("boom".into())).exit_code(),
            3
        );
        assert!(SortError::DestinationUnavailable {
            path: PathBuf::from("out"),
            message: "read-only".into(),
        }
        .is_validation());
    }

    #[test]
    fn test_walk_error_display_is_transparent() {
        let err = SortError::from(WalkError::RootUnreadable {
            path: PathBuf::from("src"),
            message: "gone".into(),
        });
        assert_eq!(err.to_string(), "cannot read source root 'src': gone");
    }
}
