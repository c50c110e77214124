use crate::models::{CollisionPolicy, CopyError, CopyResult, ExtensionBucket, FileEntry};
use crate::services::RunMode;
use crate::utils::{copy_file_safe, ensure_directory, CopyOutcome, ProgressCounter};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{error, info, warn};

/// Configuration for placing files into extension buckets
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub destination: PathBuf,
    pub mode: RunMode,
    pub collision: CollisionPolicy,
    pub lowercase_extensions: bool,
    /// Copy tasks allowed in flight at once
    pub workers: usize,
}

const LOCK_STRIPES: usize = 64;

/// Serializes copies that target the same destination path.
///
/// Two sources sharing a file name and bucket would otherwise write the same
/// file at once and could leave a mix of both. Paths hash onto a fixed set of
/// stripes, so unrelated destinations only rarely wait on each other.
#[derive(Debug)]
pub struct DestinationLocks {
    stripes: Vec<Mutex<()>>,
}

impl DestinationLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub async fn lock(&self, destination: &Path) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        destination.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}

impl Default for DestinationLocks {
    fn default() -> Self {
        Self::new(LOCK_STRIPES)
    }
}

/// Place one file at `<destination>/<bucket>/<file name>`.
///
/// Never fails: every problem becomes [`CopyResult::Failed`] carrying the
/// cause, so one bad file cannot stop the batch.
pub async fn dispatch_file(
    entry: FileEntry,
    options: &DispatchOptions,
    locks: &DestinationLocks,
) -> CopyResult {
    let bucket = entry.bucket(options.lowercase_extensions);

    if options.mode == RunMode::List {
        return CopyResult::Listed {
            source: entry.path,
            bucket,
        };
    }

    let bucket_dir = bucket.directory_in(&options.destination);
    let Some(file_name) = entry.file_name() else {
        return CopyResult::Failed {
            destination: bucket_dir,
            error: "source path has no file name".to_string(),
            source: entry.path,
        };
    };
    let destination = bucket_dir.join(file_name);

    if let Err(e) = ensure_directory(&bucket_dir).await {
        return CopyResult::Failed {
            source: entry.path,
            destination,
            error: format!("{:#}", e),
        };
    }

    let _guard = locks.lock(&destination).await;
    match copy_file_safe(&entry.path, &destination, options.collision).await {
        Ok(CopyOutcome::Copied) => CopyResult::Copied {
            source: entry.path,
            destination,
            bucket,
        },
        Ok(CopyOutcome::KeptExisting) => CopyResult::Skipped {
            source: entry.path,
            destination,
            reason: "File already exists".to_string(),
        },
        // output root == source root: the walker can meet files already in place
        Ok(CopyOutcome::SameFile) => CopyResult::Skipped {
            source: entry.path,
            destination,
            reason: "Source and destination are the same file".to_string(),
        },
        Err(e) => CopyResult::Failed {
            source: entry.path,
            destination,
            error: format!("{:#}", e),
        },
    }
}

/// Where `entry` is placed, or its bucket directory when it has no file name
fn planned_destination(entry: &FileEntry, options: &DispatchOptions) -> PathBuf {
    let bucket_dir = entry
        .bucket(options.lowercase_extensions)
        .directory_in(&options.destination);
    match entry.file_name() {
        Some(name) => bucket_dir.join(name),
        None => bucket_dir,
    }
}

/// A file seen in list mode and the bucket it would land in
#[derive(Debug, Clone, Serialize)]
pub struct ListedFile {
    pub source: String,
    pub bucket: ExtensionBucket,
}

/// Accumulated outcomes of every dispatched file
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub copied: usize,
    pub skipped: usize,
    pub errors: Vec<CopyError>,
    /// Files handled per bucket (copied or listed)
    pub buckets: BTreeMap<ExtensionBucket, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub listed: Vec<ListedFile>,
}

impl DispatchReport {
    /// Fold one result in, writing its log line
    pub fn record(&mut self, result: CopyResult) {
        match result {
            CopyResult::Copied {
                source,
                destination,
                bucket,
            } => {
                info!(
                    "File copied successfully: {} -> {}",
                    source.display(),
                    destination.display()
                );
                self.copied += 1;
                *self.buckets.entry(bucket).or_default() += 1;
            }
            CopyResult::Skipped {
                source,
                destination,
                reason,
            } => {
                warn!(
                    "Skipped copying {} to {}: {}",
                    source.display(),
                    destination.display(),
                    reason
                );
                self.skipped += 1;
            }
            CopyResult::Failed {
                source,
                destination,
                error,
            } => {
                error!("Failed to copy file {}: {}", source.display(), error);
                self.errors.push(CopyError {
                    source: source.to_string_lossy().to_string(),
                    destination: destination.to_string_lossy().to_string(),
                    error,
                });
            }
            CopyResult::Listed { source, bucket } => {
                info!("Found {} -> {}", source.display(), bucket);
                *self.buckets.entry(bucket.clone()).or_default() += 1;
                self.listed.push(ListedFile {
                    source: source.to_string_lossy().to_string(),
                    bucket,
                });
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn total_processed(&self) -> usize {
        self.copied + self.skipped + self.errors.len() + self.listed.len()
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            0.0
        } else {
            (self.copied + self.listed.len()) as f64 / total as f64
        }
    }
}

/// Drain `files`, keeping at most `workers` copies in flight.
///
/// This loop is the only owner of the report; workers hand results back
/// through the join set. The progress counter advances once per file
/// whatever the outcome. Returns when the channel is closed and every
/// started copy has finished. Dropping the future aborts outstanding copies.
pub async fn run_dispatcher(
    mut files: mpsc::Receiver<FileEntry>,
    options: Arc<DispatchOptions>,
    progress: ProgressCounter,
) -> DispatchReport {
    let workers = options.workers.max(1);
    let locks = Arc::new(DestinationLocks::default());
    let mut tasks: JoinSet<CopyResult> = JoinSet::new();
    // source and destination of every running task, for tasks that panic
    let mut in_flight: HashMap<Id, (PathBuf, PathBuf)> = HashMap::new();
    let mut report = DispatchReport::default();

    loop {
        tokio::select! {
            biased;

            Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                report.record(finish_task(joined, &mut in_flight));
                progress.inc();
            }
            received = files.recv(), if tasks.len() < workers => match received {
                Some(entry) => {
                    let paths = (entry.path.clone(), planned_destination(&entry, &options));
                    let options = Arc::clone(&options);
                    let locks = Arc::clone(&locks);
                    let handle =
                        tasks.spawn(async move { dispatch_file(entry, &options, &locks).await });
                    in_flight.insert(handle.id(), paths);
                }
                None => break,
            },
        }
    }

    while let Some(joined) = tasks.join_next_with_id().await {
        report.record(finish_task(joined, &mut in_flight));
        progress.inc();
    }

    report
}

/// Turn a joined copy task into its result; a task that panicked or was
/// cancelled becomes a failure for the file it was handling
fn finish_task(
    joined: Result<(Id, CopyResult), JoinError>,
    in_flight: &mut HashMap<Id, (PathBuf, PathBuf)>,
) -> CopyResult {
    match joined {
        Ok((id, result)) => {
            in_flight.remove(&id);
            result
        }
        Err(e) => {
            let (source, destination) = in_flight.remove(&e.id()).unwrap_or_default();
            CopyResult::Failed {
                source,
                destination,
                error: format!("copy task failed: {}", e),
            }
        }
    }
}
