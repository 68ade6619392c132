//! TransitHQ - Live transit vehicle positions on a map
//!
//! This library keeps a map view in sync with a polled feed of vehicle
//! positions. Each poll produces a [`entity::Snapshot`]; the reconciler diffs
//! it against what is on screen, and a sink adds, moves and removes the
//! corresponding markers (or replaces a clustered point layer) without ever
//! rebuilding the view.
//!
//! ```text
//!  feed ──► poller ──► ViewController ──► reconcile::diff ──► sink ──► surface
//!                           ▲                                            │
//!                           └──────── interaction ◄── clicks, hover ─────┘
//! ```
//!
//! The map-rendering engine sits behind [`surface::RenderSurface`]; the
//! bundled [`surface::HeadlessSurface`] renders in memory.

pub mod config;
pub mod entity;
pub mod feed;
pub mod interaction;
pub mod logging;
pub mod poller;
pub mod reconcile;
pub mod sink;
pub mod surface;
pub mod view;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty(), "Version should not be empty");
    }
}
