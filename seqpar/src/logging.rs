//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once at startup. `RUST_LOG` overrides the configured default filter.

use seqpar_shared::errors::{SeqparError, SeqparResult};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `seqpar=debug`.
    pub default_filter: String,
    /// Directory for a daily-rolled log file. Logs go to stderr when `None`.
    pub log_dir: Option<PathBuf>,
    /// File name prefix inside `log_dir`.
    pub file_prefix: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            log_dir: None,
            file_prefix: "seqpar.log".to_string(),
        }
    }
}

/// Install the global subscriber.
///
/// Returns the file writer guard when logging to a file; keep it alive for
/// the life of the process or buffered lines are lost. Calling this again
/// after a subscriber is installed is a no-op returning `None`.
pub fn init_logging(options: &LoggingOptions) -> SeqparResult<Option<WorkerGuard>> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Ok(None);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&options.default_filter)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let (result, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &options.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let result = builder.with_writer(writer).with_ansi(false).try_init();
            (result, Some(guard))
        }
        None => (builder.with_writer(std::io::stderr).try_init(), None),
    };

    // Another subscriber may have been installed outside this function.
    if let Err(e) = result {
        tracing::debug!("Global subscriber already set: {}", e);
        let _ = LOGGING_INITIALIZED.set(());
        return Ok(None);
    }

    let _ = LOGGING_INITIALIZED.set(());
    tracing::debug!(log_dir = ?options.log_dir, "Logging initialized");
    Ok(guard)
}

fn parse_filter(directives: &str) -> SeqparResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| SeqparError::Config(format!("invalid log filter '{}': {}", directives, e)))
}
