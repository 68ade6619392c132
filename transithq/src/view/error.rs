//! View lifecycle errors.

use thiserror::Error;

use crate::surface::SurfaceError;

/// Errors raised while mounting or driving a view.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The view was destroyed and cannot be reused.
    #[error("View has been destroyed")]
    Destroyed,

    /// The rendering surface refused a setup command.
    #[error("Surface setup failed: {0}")]
    Surface(#[from] SurfaceError),
}
