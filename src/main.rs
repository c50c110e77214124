use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use sort_by_ext::services::default_workers;
use sort_by_ext::{
    run_sort, AppConfig, CollisionPolicy, LogConfig, RunMode, RunReport, SortConfig,
    SymlinkPolicy, DEFAULT_LOG_FILE,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // .env values feed the env-backed arguments below
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    let matches = build_cli().get_matches();

    let config = match create_app_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = initialize_logging(&config.log) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    if !dotenv_loaded {
        info!("No .env file found, using system environment variables");
    }

    let code = run_application(config).await;
    std::process::exit(code);
}

fn build_cli() -> Command {
    Command::new("sort-by-ext")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Copy every file under a folder into per-extension folders")
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .help("Folder to scan")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .help("Destination folder, created if missing")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_name("MODE")
                .help("copy files, or only list what would be copied")
                .value_parser(["copy", "list"])
                .default_value("copy"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("N")
                .help("Maximum copies in flight [default: 4 x CPU count]")
                .env("SORT_BY_EXT_WORKERS")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("listing-concurrency")
                .long("listing-concurrency")
                .value_name("N")
                .help("Maximum directory listings in flight")
                .env("SORT_BY_EXT_LISTING_CONCURRENCY")
                .value_parser(clap::value_parser!(usize))
                .default_value("16"),
        )
        .arg(
            Arg::new("symlinks")
                .long("symlinks")
                .value_name("POLICY")
                .help("Treat symlinks as files, skip them, or follow linked directories")
                .value_parser(["as-file", "skip", "follow"])
                .default_value("as-file"),
        )
        .arg(
            Arg::new("on-collision")
                .long("on-collision")
                .value_name("POLICY")
                .help("What to do when the destination file already exists")
                .value_parser(["overwrite", "skip"])
                .default_value("overwrite"),
        )
        .arg(
            Arg::new("lowercase-extensions")
                .long("lowercase-extensions")
                .help("Fold extension folder names to lower case")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-count")
                .long("no-count")
                .help("Skip the counting pass; show a spinner instead of a bar")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Do not draw progress")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Set the log level (trace, debug, info, warn, error)")
                .env("SORT_BY_EXT_LOG_LEVEL")
                .default_value("info"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Append log lines to this file; '-' logs to stderr")
                .env("SORT_BY_EXT_LOG_FILE")
                .default_value(DEFAULT_LOG_FILE),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .value_name("PATH")
                .help("Write a JSON summary of the run")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

/// Build the application configuration from parsed arguments
fn create_app_config(matches: &ArgMatches) -> Result<AppConfig> {
    let source = matches
        .get_one::<PathBuf>("source")
        .cloned()
        .context("Missing source folder")?;
    let destination = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .context("Missing output folder")?;

    let mode = match matches.get_one::<String>("mode").map(String::as_str) {
        Some("list") => RunMode::List,
        _ => RunMode::Copy,
    };

    let symlinks = match matches.get_one::<String>("symlinks").map(String::as_str) {
        Some("skip") => SymlinkPolicy::Skip,
        Some("follow") => SymlinkPolicy::Follow,
        _ => SymlinkPolicy::AsFile,
    };

    let collision = match matches.get_one::<String>("on-collision").map(String::as_str) {
        Some("skip") => CollisionPolicy::Skip,
        _ => CollisionPolicy::Overwrite,
    };

    let workers = matches
        .get_one::<usize>("workers")
        .copied()
        .unwrap_or_else(default_workers);
    if workers == 0 {
        anyhow::bail!("Invalid workers value: must be at least 1");
    }

    let listing_concurrency = matches
        .get_one::<usize>("listing-concurrency")
        .copied()
        .unwrap_or(16);
    if listing_concurrency == 0 {
        anyhow::bail!("Invalid listing-concurrency value: must be at least 1");
    }

    let log_file = match matches.get_one::<String>("log-file").map(String::as_str) {
        Some("-") => None,
        Some(path) => Some(PathBuf::from(path)),
        None => Some(PathBuf::from(DEFAULT_LOG_FILE)),
    };

    Ok(AppConfig {
        sort: SortConfig {
            source,
            destination,
            mode,
            workers,
            listing_concurrency,
            symlinks,
            collision,
            lowercase_extensions: matches.get_flag("lowercase-extensions"),
            count_first: !matches.get_flag("no-count"),
            show_progress: !matches.get_flag("no-progress"),
        },
        log: LogConfig {
            level: matches
                .get_one::<String>("log-level")
                .cloned()
                .unwrap_or_else(|| "info".to_string()),
            file: log_file,
        },
        report: matches.get_one::<PathBuf>("report").cloned(),
    })
}

/// Initialize structured logging with tracing
fn initialize_logging(log: &LogConfig) -> Result<()> {
    let level = match log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match &log.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {:?}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Run the sort and map the outcome to a process exit code
async fn run_application(config: AppConfig) -> i32 {
    info!("Configuration: {:#?}", config);

    let report = match run_sort(&config.sort).await {
        Ok(report) => report,
        Err(e) => {
            error!("Error: {}", e);
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };

    print_run_report(&report);

    if report.mode == RunMode::List {
        for file in &report.files.listed {
            println!("{}\t{}", file.bucket, file.source);
        }
    }

    if let Some(path) = &config.report {
        if let Err(e) = report.write_json(path) {
            error!("{}", e);
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
        info!("Report written to {}", path.display());
    }

    match report.mode {
        RunMode::Copy => println!(
            "Copy complete: {} copied, {} skipped, {} failed",
            report.files.copied,
            report.files.skipped,
            report.files.failed()
        ),
        RunMode::List => println!("Listing complete: {} files", report.files.listed.len()),
    }

    0
}

/// Write the run summary to the log
fn print_run_report(report: &RunReport) {
    info!("=== RUN REPORT ===");
    if let Some(total) = report.expected_total {
        info!("Files counted: {}", total);
    }
    info!("Files processed: {}", report.processed);
    info!("Directories listed: {}", report.walk.directories_listed);
    info!("Directories skipped: {}", report.walk.skipped_dirs.len());
    info!("Successfully copied: {}", report.files.copied);
    info!("Skipped files: {}", report.files.skipped);
    info!("Copy errors: {}", report.files.failed());
    info!("Success rate: {:.2}%", report.files.success_rate() * 100.0);

    for (bucket, count) in &report.files.buckets {
        info!("  {}: {}", bucket, count);
    }

    info!("Copying finished");
}
