use crate::error::{SortError, WalkError};
use crate::models::{CollisionPolicy, SymlinkPolicy};
use crate::services::file_dispatcher::{run_dispatcher, DispatchOptions, DispatchReport};
use crate::services::tree_walker::{collect_files, walk, WalkOptions, WalkSummary, FILE_CHANNEL_CAPACITY};
use crate::utils::{count_files, ensure_directory, ProgressCounter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Whether files are copied or only discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    Copy,
    /// Dry run: walk and report buckets, write nothing
    List,
}

/// Configuration for one sort run
#[derive(Debug, Clone)]
pub struct SortConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: RunMode,
    pub workers: usize,
    pub listing_concurrency: usize,
    pub symlinks: SymlinkPolicy,
    pub collision: CollisionPolicy,
    pub lowercase_extensions: bool,
    /// Pre-scan the source to show a bounded progress bar
    pub count_first: bool,
    pub show_progress: bool,
}

impl SortConfig {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Self::default()
        }
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            mode: RunMode::default(),
            workers: default_workers(),
            listing_concurrency: WalkOptions::default().listing_concurrency,
            symlinks: SymlinkPolicy::default(),
            collision: CollisionPolicy::default(),
            lowercase_extensions: false,
            count_first: true,
            show_progress: false,
        }
    }
}

/// Copies are I/O bound; oversubscribe the cores
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 4)
        .unwrap_or(8)
}

/// Report for a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub mode: RunMode,
    pub source: String,
    pub destination: String,
    /// Files counted by the pre-scan, if one ran
    pub expected_total: Option<u64>,
    /// Files attempted, whatever the outcome
    pub processed: u64,
    pub walk: WalkSummary,
    pub files: DispatchReport,
}

impl RunReport {
    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<(), SortError> {
        let to_report_error = |message: String| SortError::Report {
            path: path.to_path_buf(),
            message,
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| to_report_error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| to_report_error(e.to_string()))
    }
}

/// Validate the roots, then walk the source and dispatch every file found.
///
/// Per-file and per-directory failures are logged and counted, never
/// returned. Only validation problems and unrecoverable traversal failures
/// end the run early; in that case copies not yet finished are abandoned.
pub async fn run_sort(config: &SortConfig) -> Result<RunReport, SortError> {
    let started_at = Utc::now();
    let clock = Instant::now();

    info!(
        "Starting {:?} run: {} -> {}",
        config.mode,
        config.source.display(),
        config.destination.display()
    );

    validate_source(&config.source).await?;
    if config.mode == RunMode::Copy {
        prepare_destination(&config.destination).await?;
    }

    let exclude = nested_destination(&config.source, &config.destination);
    let walk_options = WalkOptions {
        symlinks: config.symlinks,
        listing_concurrency: config.listing_concurrency,
        exclude: exclude.clone(),
    };

    let expected_total = if config.count_first {
        let total = prescan(&config.source, config.symlinks, exclude).await?;
        info!("Pre-scan found {} files", total);
        Some(total)
    } else {
        None
    };

    let progress = match expected_total {
        Some(total) => ProgressCounter::with_total(total, config.show_progress),
        None => ProgressCounter::indeterminate(config.show_progress),
    };

    let dispatch_options = Arc::new(DispatchOptions {
        destination: config.destination.clone(),
        mode: config.mode,
        collision: config.collision,
        lowercase_extensions: config.lowercase_extensions,
        workers: config.workers,
    });

    let outcome = match config.mode {
        RunMode::Copy => stream_copy(&config.source, &walk_options, dispatch_options, &progress).await,
        RunMode::List => buffered_list(&config.source, &walk_options, dispatch_options, &progress).await,
    };

    let (walk_summary, files) = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.abandon("aborted");
            error!("Error while reading folder: {}", e);
            return Err(e.into());
        }
    };

    progress.finish("done");

    let report = RunReport {
        started_at,
        duration_secs: clock.elapsed().as_secs_f64(),
        mode: config.mode,
        source: config.source.to_string_lossy().to_string(),
        destination: config.destination.to_string_lossy().to_string(),
        expected_total,
        processed: progress.position(),
        walk: walk_summary,
        files,
    };

    info!(
        "Run finished in {:.2}s. Processed: {}, Copied: {}, Skipped: {}, Errors: {}",
        report.duration_secs,
        report.processed,
        report.files.copied,
        report.files.skipped,
        report.files.failed()
    );

    Ok(report)
}

/// Walker and dispatcher run side by side; files are copied as they are found
async fn stream_copy(
    source: &Path,
    walk_options: &WalkOptions,
    dispatch_options: Arc<DispatchOptions>,
    progress: &ProgressCounter,
) -> Result<(WalkSummary, DispatchReport), WalkError> {
    let (tx, rx) = mpsc::channel(FILE_CHANNEL_CAPACITY);

    let walker = walk(source, walk_options, tx);
    let dispatcher = async {
        Ok::<_, WalkError>(run_dispatcher(rx, dispatch_options, progress.clone()).await)
    };

    tokio::try_join!(walker, dispatcher)
}

/// Walk first, then hand the buffered list to the dispatcher
async fn buffered_list(
    source: &Path,
    walk_options: &WalkOptions,
    dispatch_options: Arc<DispatchOptions>,
    progress: &ProgressCounter,
) -> Result<(WalkSummary, DispatchReport), WalkError> {
    let (files, walk_summary) = collect_files(source, walk_options).await?;

    let (tx, rx) = mpsc::channel(FILE_CHANNEL_CAPACITY);
    let feeder = async move {
        for entry in files {
            if tx.send(entry).await.is_err() {
                break;
            }
        }
    };

    let (_, report) = tokio::join!(feeder, run_dispatcher(rx, dispatch_options, progress.clone()));
    Ok((walk_summary, report))
}

async fn validate_source(source: &Path) -> Result<(), SortError> {
    match tokio::fs::metadata(source).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(SortError::SourceNotDirectory(source.to_path_buf())),
    }
}

async fn prepare_destination(destination: &Path) -> Result<(), SortError> {
    let unavailable = |message: String| SortError::DestinationUnavailable {
        path: destination.to_path_buf(),
        message,
    };

    match tokio::fs::metadata(destination).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(unavailable("exists and is not a directory".to_string())),
        Err(_) => ensure_directory(destination)
            .await
            .map_err(|e| unavailable(format!("{:#}", e))),
    }
}

async fn prescan(
    source: &Path,
    policy: SymlinkPolicy,
    exclude: Option<PathBuf>,
) -> Result<u64, WalkError> {
    let root = source.to_path_buf();
    tokio::task::spawn_blocking(move || count_files(&root, policy, exclude))
        .await
        .map_err(|e| WalkError::TaskFailed(e.to_string()))?
        .map_err(|e| WalkError::RootUnreadable {
            path: source.to_path_buf(),
            message: format!("{:#}", e),
        })
}

/// If the destination lies inside the source, its path as the walker will
/// see it, so the walk can leave it out
fn nested_destination(source: &Path, destination: &Path) -> Option<PathBuf> {
    let source_canonical = std::fs::canonicalize(source).ok()?;
    let destination_canonical = std::fs::canonicalize(destination).ok()?;
    let relative = destination_canonical.strip_prefix(&source_canonical).ok()?;

    if relative.as_os_str().is_empty() {
        // output == source; nothing sensible to exclude
        return None;
    }
    Some(source.join(relative))
}
