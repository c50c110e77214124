use crate::models::ExtensionBucket;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do when the destination file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Last writer wins, silently
    #[default]
    Overwrite,
    /// Leave the existing file alone and report the source as skipped
    Skip,
}

/// Outcome of handling one discovered file
#[derive(Debug, Clone)]
pub enum CopyResult {
    Copied {
        source: PathBuf,
        destination: PathBuf,
        bucket: ExtensionBucket,
    },
    Skipped {
        source: PathBuf,
        destination: PathBuf,
        reason: String,
    },
    Failed {
        source: PathBuf,
        destination: PathBuf,
        error: String,
    },
    /// List mode: discovered and classified, nothing written
    Listed {
        source: PathBuf,
        bucket: ExtensionBucket,
    },
}

impl CopyResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CopyResult::Copied { .. } | CopyResult::Listed { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CopyResult::Failed { .. })
    }
}

/// Serializable record of a failed copy
#[derive(Debug, Clone, Serialize)]
pub struct CopyError {
    pub source: String,
    pub destination: String,
    pub error: String,
}
