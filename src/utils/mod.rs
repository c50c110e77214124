pub mod file_operations;
pub mod progress;

pub use file_operations::{
    copy_file_safe, count_files, ensure_directory, list_directory, CopyOutcome, Listing,
    VisitedDirs,
};
pub use progress::ProgressCounter;
