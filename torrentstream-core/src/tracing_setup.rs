//! Log output for torrentstream binaries
//!
//! Two sinks: the console, at the level picked on the command line, and a
//! trace-level log of the last run on disk. Engine alerts are logged under
//! [`ALERTS_TARGET`] and kept off the console unless the console level is
//! debug or finer.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log inside the logs directory.
pub const LAST_RUN_LOG: &str = "torrentstream-last-run.log";

/// Target engine alerts are forwarded under.
pub const ALERTS_TARGET: &str = "torrentstream::alerts";

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Cannot write trace log to {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Global subscriber already installed")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Console filter directives for `level`.
///
/// Alerts arrive every monitor tick, so below debug only warnings and errors
/// from the engine reach the console.
pub fn console_directives(level: Level) -> String {
    let alerts = if level >= Level::DEBUG {
        level
    } else {
        Level::WARN.min(level)
    };
    format!(
        "{},{}={}",
        level.as_str().to_lowercase(),
        ALERTS_TARGET,
        alerts.as_str().to_lowercase()
    )
}

/// Installs the console and last-run file sinks as the global subscriber.
///
/// `RUST_LOG` replaces the console directives when set. The file sink always
/// records everything and is truncated on every run.
///
/// # Errors
/// - `TracingError::LogFile` - Logs directory or log file could not be created
/// - `TracingError::AlreadyInstalled` - Another subscriber is already global
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<PathBuf, TracingError> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new("logs"));
    let log_path = logs_dir.join(LAST_RUN_LOG);
    let log_file = create_dir_all(logs_dir)
        .and_then(|()| File::create(&log_path))
        .map_err(|source| TracingError::LogFile {
            path: log_path.clone(),
            source,
        })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let last_run = fmt::layer()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console)
        .with(last_run)
        .try_init()?;

    tracing::debug!("Console at {}, full trace in {}", console_level, log_path.display());
    Ok(log_path)
}

/// Console verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    /// Also shows every engine alert
    Debug,
    Trace,
}

impl CliLogLevel {
    /// # Examples
    /// ```
    /// use torrentstream_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Info.as_tracing_level(), tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true).map_err(|_| format!("Invalid log level: {s}"))
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing_round_trips_display() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            let parsed: CliLogLevel = level.parse().unwrap();
            assert_eq!(parsed.to_string(), level);
        }
        assert_eq!("WARN".parse::<CliLogLevel>(), Ok(CliLogLevel::Warn));
        assert!("verbose".parse::<CliLogLevel>().is_err());
    }

    #[test]
    fn test_alerts_quiet_below_debug() {
        assert_eq!(
            console_directives(Level::INFO),
            "info,torrentstream::alerts=warn"
        );
        assert_eq!(
            console_directives(Level::ERROR),
            "error,torrentstream::alerts=error"
        );
        assert_eq!(
            console_directives(Level::DEBUG),
            "debug,torrentstream::alerts=debug"
        );
        assert_eq!(
            console_directives(Level::TRACE),
            "trace,torrentstream::alerts=trace"
        );
    }

    #[test]
    fn test_console_directives_parse() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            assert!(EnvFilter::try_new(console_directives(level)).is_ok());
        }
    }

    #[test]
    fn test_unwritable_logs_dir_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let error = init_tracing(Level::WARN, Some(&blocker)).unwrap_err();
        assert!(matches!(error, TracingError::LogFile { path, .. } if path.starts_with(&blocker)));
    }

    #[test]
    fn test_init_tracing_creates_last_run_log() {
        let dir = tempfile::tempdir().unwrap();
        // A global subscriber may already be installed by another test.
        let _ = init_tracing(Level::WARN, Some(dir.path()));
        assert!(dir.path().join(LAST_RUN_LOG).exists());
    }
}
