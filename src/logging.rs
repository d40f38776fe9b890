//! Logging setup: console or rotating file output through `tracing`, plus
//! the event macros used across the crate.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

const SERVER_LOG_FILE: &str = "server.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub color: bool,
    pub timestamps: bool,
    /// One JSON object per event
    pub json: bool,
    /// Daily-rotated file instead of stderr
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Console logging from the global CLI flags. `verbose` wins over `quiet`.
    pub fn from_args(quiet: bool, verbose: bool, json: bool) -> Self {
        let level = if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            Level::INFO
        };

        Self {
            level,
            color: !quiet && !json && io::stderr().is_terminal(),
            timestamps: verbose || json,
            json,
            file: None,
        }
    }

    /// A detached server: timestamped, uncolored, into `<data_dir>/logs/server.log`
    pub fn server_file(data_dir: &Path, json: bool) -> Self {
        Self {
            level: Level::INFO,
            color: false,
            timestamps: true,
            json,
            file: Some(server_log_path(data_dir)),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "taskcal={level},tower_http={level}",
            level = config.level
        ))
    });

    let writer = match &config.file {
        Some(log_file) => {
            let dir = log_file.parent().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file path")
            })?;
            let name = log_file.file_name().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name")
            })?;
            BoxMakeWriter::new(tracing_appender::rolling::daily(dir, name))
        },
        None => BoxMakeWriter::new(io::stderr),
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(writer)
            .boxed()
    } else if config.timestamps {
        fmt::layer()
            .with_ansi(config.color)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(config.color)
            .with_target(false)
            .without_time()
            .with_writer(writer)
            .boxed()
    };

    Registry::default()
        .with(layer.with_filter(env_filter))
        .try_init()
        .map_err(io::Error::other)
}

/// Delete rotated server logs (`server.log.<date>`) older than
/// `retention_days`. The live log and any other file are kept.
///
/// ```no_run
/// use std::path::Path;
/// use taskcal::logging::cleanup_old_logs;
///
/// cleanup_old_logs(Path::new("data/logs"), 7).ok();
/// ```
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> io::Result<()> {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let rotated_prefix = format!("{}.", SERVER_LOG_FILE);

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry?;
        let is_rotated = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&rotated_prefix));
        let metadata = entry.metadata()?;
        if !is_rotated || !metadata.is_file() {
            continue;
        }

        let age = SystemTime::now()
            .duration_since(metadata.modified()?)
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let path = entry.path();
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), "Failed to remove old log: {}", e),
        }
    }

    if removed > 0 {
        tracing::info!(removed = removed, "Removed old server logs");
    }
    Ok(())
}

/// Log directory for a given data directory
pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Live server log, creating the log directory if needed
pub fn server_log_path(data_dir: &Path) -> PathBuf {
    let dir = log_dir(data_dir);
    std::fs::create_dir_all(&dir).ok();
    dir.join(SERVER_LOG_FILE)
}

/// `log_task_operation!("move", id)`, optionally with a detail value
#[macro_export]
macro_rules! log_task_operation {
    ($operation:expr, $task_id:expr $(, $details:expr)?) => {
        tracing::info!(
            operation = $operation,
            task_id = $task_id,
            $(details = $details,)?
            "Task operation"
        );
    };
}

#[macro_export]
macro_rules! log_chat_operation {
    ($operation:expr $(, $details:expr)?) => {
        tracing::debug!(operation = $operation, $(details = $details,)? "Chat operation");
    };
}

#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(error = %$error, context = $context, "Operation failed");
    };
}
