//! Logging setup.
//!
//! Installs a `tracing` subscriber writing to a log file through a
//! non-blocking appender, optionally mirrored to stderr. `RUST_LOG` overrides
//! the configured level.
//!
//! # Example
//!
//! ```ignore
//! let config = ConfigFile::load()?;
//! let _guard = transithq::logging::init_logging(&config.logging, false)?;
//! tracing::info!("started");
//! ```

use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;

/// Filter used when `RUST_LOG` is not set: `level` for this crate and its
/// CLI, `warn` for dependencies.
pub fn default_filter(level: &str) -> String {
    format!("warn,transithq={level},transithq_cli={level}", level = level)
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init_logging(settings: &LoggingSettings, stderr: bool) -> io::Result<WorkerGuard> {
    let directory = settings
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ".".into());
    let file_name = settings
        .file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log file has no name"))?;
    std::fs::create_dir_all(&directory)?;

    let appender = tracing_appender::rolling::never(&directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&settings.level)));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    let stderr_layer = stderr.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter("debug"),
            "warn,transithq=debug,transithq_cli=debug"
        );
        assert!(EnvFilter::try_new(default_filter("info")).is_ok());
    }
}
