//! Visual sinks: apply reconciliation deltas to a rendering surface.
//!
//! A sink owns the displayed set (entity id to on-screen representation) and
//! is the only component that mutates it. Two strategies are provided:
//!
//! | Mode | Sink | Per snapshot |
//! |------|------|--------------|
//! | [`SinkMode::Clustered`] | [`ClusterSink`] | replace the clustered source data wholesale |
//! | [`SinkMode::Markers`] | [`MarkerSink`] | create, move, remove discrete markers |
//!
//! Both keep the displayed key set equal to the id set of the last applied
//! snapshot. Surface command failures are logged and skipped per entity.
//!
//! # Example
//!
//! ```ignore
//! use transithq::reconcile::diff;
//! use transithq::sink::SinkMode;
//!
//! let mut sink = SinkMode::Markers.build(ClusterOptions::default());
//! sink.install(surface.as_mut())?;
//!
//! let delta = diff(&sink.displayed_ids(), &snapshot);
//! let report = sink.apply(surface.as_mut(), &snapshot, &delta)?;
//! ```

mod clustered;
mod markers;

pub use clustered::{ClusterSink, CLUSTER_COUNT_LAYER, CLUSTER_LAYER, POINT_LAYER, SOURCE_ID};
pub use markers::MarkerSink;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::entity::{Entity, EntityId, Snapshot};
use crate::reconcile::Delta;
use crate::surface::{ClusterOptions, MarkerId, RenderSurface, SurfaceError};

/// How entities are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// One clustered point layer, aggregated by the surface.
    #[default]
    Clustered,
    /// One discrete marker per entity.
    Markers,
}

impl SinkMode {
    /// Create a sink for this mode.
    pub fn build(self, cluster: ClusterOptions) -> Box<dyn EntitySink> {
        match self {
            SinkMode::Clustered => Box::new(ClusterSink::new(cluster)),
            SinkMode::Markers => Box::new(MarkerSink::new()),
        }
    }

    /// Configuration name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkMode::Clustered => "clustered",
            SinkMode::Markers => "markers",
        }
    }
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clustered" | "cluster" => Ok(SinkMode::Clustered),
            "markers" | "marker" => Ok(SinkMode::Markers),
            other => Err(format!(
                "unknown display mode '{}' (expected 'clustered' or 'markers')",
                other
            )),
        }
    }
}

/// What a surface layer shows, as far as interaction is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    /// Aggregates that expand on tap.
    Aggregate,
    /// Individual entities that open a popup on tap.
    Point,
}

/// Outcome of applying one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Entities newly displayed.
    pub added: usize,
    /// Entities still displayed.
    pub updated: usize,
    /// Updated entities whose position changed on screen.
    pub moved: usize,
    /// Entities no longer displayed.
    pub removed: usize,
    /// Surface commands that failed and were skipped.
    pub failed: usize,
}

impl ApplyReport {
    /// Whether anything on screen changed.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.moved == 0 && self.removed == 0
    }
}

/// Applies reconciliation deltas to a rendering surface.
///
/// Callers must not invoke [`apply`](EntitySink::apply) before the surface
/// has signalled readiness, nor anything after
/// [`teardown`](EntitySink::teardown).
pub trait EntitySink: Send {
    /// Which mode this sink implements.
    fn mode(&self) -> SinkMode;

    /// Register the sources and layers this sink draws with.
    fn install(&mut self, surface: &mut dyn RenderSurface) -> Result<(), SurfaceError>;

    /// Bring the surface in line with `snapshot`.
    ///
    /// `delta` must have been computed from [`displayed_ids`](Self::displayed_ids)
    /// and `snapshot`.
    fn apply(
        &mut self,
        surface: &mut dyn RenderSurface,
        snapshot: &Snapshot,
        delta: &Delta<'_>,
    ) -> Result<ApplyReport, SurfaceError>;

    /// Displayed entity by id.
    fn entity(&self, id: &EntityId) -> Option<&Entity>;

    /// Displayed entity behind a discrete marker.
    fn entity_for_marker(&self, marker: MarkerId) -> Option<&Entity>;

    /// Interaction role of a layer this sink registered.
    fn layer_role(&self, layer: &str) -> Option<LayerRole>;

    /// Ids currently displayed.
    fn displayed_ids(&self) -> HashSet<EntityId>;

    /// Number of displayed entities.
    fn displayed_len(&self) -> usize;

    /// Remove every visual this sink created.
    fn teardown(&mut self, surface: &mut dyn RenderSurface);
}
