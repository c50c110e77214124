pub mod copy_result;
pub mod file_entry;

pub use copy_result::{CollisionPolicy, CopyError, CopyResult};
pub use file_entry::{
    classify_entry, EntryKind, ExtensionBucket, FileEntry, SymlinkPolicy, NO_EXTENSION,
};
