//! Tracing setup for piecefs
//!
//! Logs go to stderr because `cat` writes file contents to stdout. A full
//! trace log can be kept on disk to diagnose a stalled read after the fact.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the trace log inside the logs directory, overwritten each run.
pub const TRACE_LOG_NAME: &str = "piecefs-last-run.log";

/// Installs the global subscriber.
///
/// The console layer filters at `console_level` unless `RUST_LOG` is set.
/// When `logs_dir` is given, a second layer records everything at trace
/// level into [`TRACE_LOG_NAME`] there. Both layers carry thread names so
/// dispatch-thread and reader-thread lines can be told apart.
///
/// Returns the trace log path, if one was opened.
///
/// # Errors
///
/// - `std::io::Error` - If the logs directory or the log file cannot be created
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> std::io::Result<Option<PathBuf>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.as_str()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (path, file) = match logs_dir.map(open_trace_log).transpose()? {
        Some((path, file)) => (Some(path), Some(file)),
        None => (None, None),
    };

    let file_layer = file.map(|file| {
        fmt::layer()
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(file)
            .with_filter(EnvFilter::new("trace"))
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    match &path {
        Some(path) => tracing::info!(
            "Tracing initialized: console={console_level}, trace_file={}",
            path.display()
        ),
        None => tracing::info!("Tracing initialized: console={console_level}"),
    }

    Ok(path)
}

fn open_trace_log(dir: &Path) -> std::io::Result<(PathBuf, File)> {
    create_dir_all(dir)?;
    let path = dir.join(TRACE_LOG_NAME);
    let file = File::create(&path)?;
    Ok((path, file))
}

/// Console verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes notifications the dispatcher ignores
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}
