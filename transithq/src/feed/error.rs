//! Positions feed error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while retrieving or decoding a positions feed.
///
/// None of these are fatal: the poller reports them and tries again on the
/// next tick.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// Transport-level failure (connection refused, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The feed answered with a non-success status.
    #[error("API error: {status} {body}")]
    Status { status: u16, body: String },

    /// The body could not be interpreted as a positions snapshot.
    #[error("Malformed feed body: {0}")]
    Malformed(String),

    /// A file-backed feed could not be read.
    #[error("Failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}
