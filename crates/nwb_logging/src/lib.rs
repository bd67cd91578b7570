//! Logging setup for applications embedding the schema translator and the
//! file resolver.
//!
//! The libraries only emit `tracing` events. A host calls [`init_logging`]
//! once to route them to daily log files and to stderr; test suites call
//! [`init_test_logging`] to see them in captured test output.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "nwb_hdf5=info,nwb_linkml=info";
const TEST_LOG_FILTER: &str = "nwb_hdf5=debug,nwb_linkml=debug";
const DEFAULT_APP_NAME: &str = "nwb_linkml";
const MAX_LOG_FILES: usize = 5;

/// Logging configuration for a host application.
#[derive(Debug, Clone, Default)]
pub struct LogConfig<'a> {
    /// Prefix of the log file names
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
    /// Directory for log files; the platform data directory when unset
    pub log_dir: Option<PathBuf>,
    /// Filter directives; [`DEFAULT_LOG_FILTER`] when unset
    pub filter: Option<&'a str>,
}

/// Keeps the background file writer running. Dropping it flushes
/// buffered events.
#[must_use = "events are lost once the guard is dropped"]
pub struct LogGuard {
    log_dir: PathBuf,
    _worker: WorkerGuard,
}

impl LogGuard {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Install the global subscriber: daily-rotated files (the newest
/// `MAX_LOG_FILES` are kept) plus stderr.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;

    let prefix = match sanitize_name(config.app_name) {
        name if name.is_empty() => DEFAULT_APP_NAME.to_string(),
        name => name,
    };
    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(&log_dir)
        .with_context(|| format!("Failed to open log files in {}", log_dir.display()))?;
    let (file_writer, worker) = tracing_appender::non_blocking(appender);

    let directives = config.filter.unwrap_or(DEFAULT_LOG_FILTER);
    let file_filter =
        EnvFilter::try_new(directives).with_context(|| format!("Invalid log filter: {directives}"))?;
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LogGuard {
        log_dir,
        _worker: worker,
    })
}

/// Send debug events from both libraries to the test harness's captured
/// output. Later calls, or calls after another subscriber was installed,
/// do nothing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(TEST_LOG_FILTER))
        .with_test_writer()
        .try_init();
}

/// `<local data dir>/nwb_linkml/logs`
pub fn default_log_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("nwb_linkml").join("logs"))
        .context("Could not determine the local data directory")
}

/// Keep ASCII alphanumerics, `-` and `_`; replace everything else.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("nwb-resolve"), "nwb-resolve");
        assert_eq!(sanitize_name("my app/v1.2"), "my_app_v1_2");
    }

    #[test]
    fn test_default_log_dir() {
        if let Ok(dir) = default_log_dir() {
            assert!(dir.ends_with("nwb_linkml/logs"));
        }
    }

    #[test]
    fn test_init_logging_writes_events() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let guard = init_logging(LogConfig {
            app_name: "resolver test",
            log_dir: Some(log_dir.clone()),
            filter: Some("nwb_logging=debug"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(guard.log_dir(), log_dir);

        tracing::info!(target: "nwb_logging", passes = 3, "Resolved file");
        tracing::debug!(target: "elsewhere", "Filtered out");
        drop(guard);

        let files: Vec<PathBuf> = fs::read_dir(&log_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("resolver_test"));
        assert!(name.ends_with(".log"));
        let contents = fs::read_to_string(&files[0]).unwrap();
        assert!(contents.contains("Resolved file"));
        assert!(contents.contains("passes=3"));
        assert!(!contents.contains("Filtered out"));

        assert!(init_logging(LogConfig {
            app_name: "again",
            log_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .is_err());
    }
}
