pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::PathBuf;

// Re-export commonly used types
pub use error::{SortError, WalkError};
pub use models::{
    CollisionPolicy, CopyResult, ExtensionBucket, FileEntry, SymlinkPolicy, NO_EXTENSION,
};
pub use services::{
    collect_files, dispatch_file, run_sort, walk, DispatchOptions, DispatchReport, RunMode,
    RunReport, SortConfig, WalkOptions, WalkSummary,
};
pub use utils::ProgressCounter;

/// Default log file, appended to on every run
pub const DEFAULT_LOG_FILE: &str = "log.txt";

// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sort: SortConfig,
    pub log: LogConfig,
    /// Where to write the JSON run report, if anywhere
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    /// `None` logs to stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}
