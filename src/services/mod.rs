pub mod file_dispatcher;
pub mod sort_run;
pub mod tree_walker;

pub use file_dispatcher::{
    dispatch_file, run_dispatcher, DestinationLocks, DispatchOptions, DispatchReport, ListedFile,
};
pub use sort_run::{default_workers, run_sort, RunMode, RunReport, SortConfig};
pub use tree_walker::{collect_files, walk, SkippedDir, WalkOptions, WalkSummary, FILE_CHANNEL_CAPACITY};
