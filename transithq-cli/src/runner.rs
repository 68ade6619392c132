//! Shared command setup: configuration, logging and the async runtime.

use tokio::runtime::Runtime;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use transithq::config::{config_file_path, ConfigFile};
use transithq::logging::init_logging;

use crate::error::CliError;

/// Everything a long-running command needs before it starts.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    // Flushes the log file when dropped.
    _log_guard: WorkerGuard,
}

impl CliRunner {
    /// Load configuration, start logging and build the runtime.
    ///
    /// With `verbose`, log output is mirrored to stderr.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let log_guard = init_logging(&config.logging, verbose).map_err(CliError::Logging)?;
        let runtime = Runtime::new().map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    /// Record which command started and from which config.
    pub fn log_startup(&self, command: &str) {
        info!(
            version = transithq::VERSION,
            command,
            config = %config_file_path().display(),
            log_file = %self.config.logging.file.display(),
            "TransitHQ starting"
        );
    }

    /// Loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// The command's runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}
