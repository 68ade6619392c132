//! CLI error type.

use std::fmt;

use transithq::config::ConfigError;
use transithq::feed::FeedError;
use transithq::view::ViewError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration or arguments.
    Config(String),
    /// The positions feed failed.
    Feed(FeedError),
    /// The view could not be mounted.
    View(ViewError),
    /// Logging could not be set up.
    Logging(std::io::Error),
    /// The async runtime could not be started.
    Runtime(std::io::Error),
    /// A background task panicked or was aborted.
    Task(String),
    /// Output could not be written.
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Feed(e) => write!(f, "Feed error: {}", e),
            CliError::View(e) => write!(f, "View error: {}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Task(msg) => write!(f, "Background task failed: {}", msg),
            CliError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Feed(e) => Some(e),
            CliError::View(e) => Some(e),
            CliError::Logging(e) | CliError::Runtime(e) => Some(e),
            CliError::Config(_) | CliError::Task(_) | CliError::Output(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<FeedError> for CliError {
    fn from(e: FeedError) -> Self {
        CliError::Feed(e)
    }
}

impl From<ViewError> for CliError {
    fn from(e: ViewError) -> Self {
        CliError::View(e)
    }
}
