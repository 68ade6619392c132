//! Rendering surface contract.
//!
//! The map-rendering engine is an external collaborator. The engine drives it
//! exclusively through [`RenderSurface`], and receives its signals (ready,
//! clicks, hover) as [`SurfaceEvent`]s pushed through [`SurfaceEvents`].
//!
//! ```text
//!                 commands (&mut dyn RenderSurface)
//!  ViewController ───────────────────────────────────► surface
//!        ▲                                               │
//!        └──────────── SurfaceEvents::emit ◄─────────────┘
//!                     (ready, click, hover)
//! ```
//!
//! [`HeadlessSurface`] is a complete in-memory implementation with its own
//! clustering index. It backs the CLI and the test suite.

mod cluster;
mod headless;

pub use cluster::GridClusterIndex;
pub use headless::{HeadlessProbe, HeadlessSurface, HeadlessSurfaceFactory, ReadyMode, SurfaceOp};

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use geojson::{FeatureCollection, JsonObject};
use serde_json::Value;
use thiserror::Error;

use crate::entity::{EntityId, LngLat, PROPERTY_ID};

/// Feature property marking an aggregate.
pub const PROPERTY_CLUSTER: &str = "cluster";
/// Feature property carrying an aggregate's identifier.
pub const PROPERTY_CLUSTER_ID: &str = "cluster_id";
/// Feature property carrying an aggregate's member count.
pub const PROPERTY_POINT_COUNT: &str = "point_count";

/// Errors reported by a rendering surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SurfaceError {
    /// The surface has been destroyed.
    #[error("Surface has been destroyed")]
    Destroyed,

    /// No source with this id.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// A source with this id already exists.
    #[error("Source already exists: {0}")]
    DuplicateSource(String),

    /// No layer with this id.
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// No marker with this handle.
    #[error("Unknown marker: {0}")]
    UnknownMarker(MarkerId),

    /// The clustering index has no such aggregate (stale or swapped data).
    #[error("Unknown cluster {0}")]
    UnknownCluster(u64),

    /// The source is not clustered.
    #[error("Source {0} is not clustered")]
    NotClustered(String),

    /// Engine-specific failure.
    #[error("Surface error: {0}")]
    Backend(String),
}

/// Handle of a discrete marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Handle of an open popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopupId(pub u64);

/// Construction parameters for a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    /// Style document URL.
    pub style: String,
    /// Initial camera center.
    pub center: LngLat,
    /// Initial zoom level.
    pub zoom: f64,
    /// Whether to show zoom/rotation controls.
    pub navigation_control: bool,
}

/// Clustering parameters of a point source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterOptions {
    /// Highest zoom at which points are still aggregated.
    pub max_zoom: u8,
    /// Aggregation radius in screen pixels.
    pub radius: u32,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            max_zoom: 14,
            radius: 50,
        }
    }
}

/// A point data source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    /// Source id.
    pub id: String,
    /// Clustering parameters, `None` for a plain source.
    pub cluster: Option<ClusterOptions>,
}

/// What a layer draws from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Circles for aggregates.
    ClusterCircles,
    /// Member-count labels on aggregates.
    ClusterCount,
    /// Circles for individual (unclustered) points.
    Points,
}

/// A visual layer keyed to a source.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Layer id.
    pub id: String,
    /// Source the layer draws from.
    pub source: String,
    /// What the layer draws.
    pub kind: LayerKind,
}

/// A discrete marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    /// Marker position.
    pub position: LngLat,
    /// Tooltip text.
    pub title: String,
}

/// Content of a detail popup.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupSpec {
    /// Anchor position.
    pub position: LngLat,
    /// The entity the popup describes.
    pub entity_id: EntityId,
    /// Heading line.
    pub title: String,
    /// Detail lines below the heading.
    pub lines: Vec<String>,
}

impl PopupSpec {
    /// Plain-text rendering, one line per entry.
    pub fn text(&self) -> String {
        let mut text = self.title.clone();
        for line in &self.lines {
            text.push('\n');
            text.push_str(line);
        }
        text
    }
}

/// Pointer style hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    /// Regular map cursor.
    #[default]
    Default,
    /// Clickable-element cursor.
    Pointer,
}

/// Layer event kinds a caller can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerEvent {
    /// Clicks on rendered features.
    Click,
    /// Pointer entering and leaving rendered features.
    Hover,
}

/// A feature as rendered (and hit-tested) by the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    /// Rendered position.
    pub position: LngLat,
    /// Feature properties.
    pub properties: JsonObject,
}

impl RenderedFeature {
    /// Aggregate id, if this feature is an aggregate.
    pub fn cluster_id(&self) -> Option<u64> {
        self.properties
            .get(PROPERTY_CLUSTER_ID)
            .and_then(Value::as_u64)
    }

    /// Member count, if this feature is an aggregate.
    pub fn point_count(&self) -> Option<u64> {
        self.properties
            .get(PROPERTY_POINT_COUNT)
            .and_then(Value::as_u64)
    }

    /// Entity id of an individual point feature.
    pub fn entity_id(&self) -> Option<EntityId> {
        self.properties
            .get(PROPERTY_ID)
            .and_then(Value::as_str)
            .map(EntityId::from)
    }
}

/// Signals raised by the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// The surface finished loading and accepts data.
    Ready,
    /// A feature on a subscribed layer was clicked.
    Click { layer: String, feature: RenderedFeature },
    /// A discrete marker was clicked.
    MarkerClick { marker: MarkerId },
    /// The pointer entered a feature on a subscribed layer.
    PointerEnter { layer: String },
    /// The pointer left a feature on a subscribed layer.
    PointerLeave { layer: String },
}

/// Sender half the surface uses to raise [`SurfaceEvent`]s.
#[derive(Clone)]
pub struct SurfaceEvents {
    emit: Arc<dyn Fn(SurfaceEvent) + Send + Sync>,
}

impl SurfaceEvents {
    /// Wrap a delivery function.
    pub fn new(emit: impl Fn(SurfaceEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Raise an event.
    pub fn emit(&self, event: SurfaceEvent) {
        (self.emit)(event)
    }
}

impl fmt::Debug for SurfaceEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceEvents").finish_non_exhaustive()
    }
}

/// Commands the engine issues against the map-rendering surface.
///
/// Implementations own whatever engine handle they wrap. The view controller
/// is the only holder of a `Box<dyn RenderSurface>` and never calls anything
/// after [`destroy`](RenderSurface::destroy).
pub trait RenderSurface: Send {
    /// Register a point data source.
    fn add_source(&mut self, source: SourceSpec) -> Result<(), SurfaceError>;

    /// Register a visual layer keyed to an existing source.
    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError>;

    /// Replace a source's data wholesale.
    fn set_source_data(&mut self, source: &str, data: FeatureCollection)
        -> Result<(), SurfaceError>;

    /// Create a discrete marker.
    fn create_marker(&mut self, marker: MarkerSpec) -> Result<MarkerId, SurfaceError>;

    /// Move an existing marker in place.
    fn move_marker(&mut self, marker: MarkerId, position: LngLat) -> Result<(), SurfaceError>;

    /// Remove a marker.
    fn remove_marker(&mut self, marker: MarkerId) -> Result<(), SurfaceError>;

    /// Route click or hover events of a layer to [`SurfaceEvents`].
    fn subscribe(&mut self, layer: &str, event: LayerEvent) -> Result<(), SurfaceError>;

    /// Resolve the zoom at which an aggregate splits apart.
    ///
    /// The returned future does not borrow the surface.
    fn cluster_expansion_zoom(
        &self,
        source: &str,
        cluster_id: u64,
    ) -> BoxFuture<'static, Result<f64, SurfaceError>>;

    /// Animate the camera to `center` at `zoom`.
    fn ease_to(&mut self, center: LngLat, zoom: f64) -> Result<(), SurfaceError>;

    /// Open a popup.
    fn open_popup(&mut self, popup: PopupSpec) -> Result<PopupId, SurfaceError>;

    /// Close a popup.
    fn close_popup(&mut self, popup: PopupId) -> Result<(), SurfaceError>;

    /// Set the pointer style.
    fn set_cursor(&mut self, cursor: Cursor) -> Result<(), SurfaceError>;

    /// Current zoom level.
    fn zoom(&self) -> f64;

    /// Destroy the surface and everything on it.
    fn destroy(&mut self);
}

/// Creates rendering surfaces for mounted views.
pub trait SurfaceFactory: Send + Sync {
    /// Construct a surface. The surface raises [`SurfaceEvent::Ready`]
    /// through `events` once it accepts data.
    fn create(
        &self,
        options: &SurfaceOptions,
        events: SurfaceEvents,
    ) -> Result<Box<dyn RenderSurface>, SurfaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_feature_accessors() {
        let mut properties = JsonObject::new();
        properties.insert(PROPERTY_CLUSTER_ID.to_string(), Value::from(7u64));
        properties.insert(PROPERTY_POINT_COUNT.to_string(), Value::from(3u64));
        let cluster = RenderedFeature {
            position: LngLat::new(0.0, 0.0),
            properties,
        };
        assert_eq!(cluster.cluster_id(), Some(7));
        assert_eq!(cluster.point_count(), Some(3));
        assert_eq!(cluster.entity_id(), None);

        let mut properties = JsonObject::new();
        properties.insert(PROPERTY_ID.to_string(), Value::from("bus-1"));
        let point = RenderedFeature {
            position: LngLat::new(0.0, 0.0),
            properties,
        };
        assert_eq!(point.entity_id(), Some(EntityId::from("bus-1")));
        assert_eq!(point.cluster_id(), None);
    }

    #[test]
    fn test_popup_text() {
        let popup = PopupSpec {
            position: LngLat::new(0.0, 0.0),
            entity_id: EntityId::from("1042"),
            title: "Vehicle 1042".to_string(),
            lines: vec!["Route 7".to_string()],
        };
        assert_eq!(popup.text(), "Vehicle 1042\nRoute 7");
    }

    #[test]
    fn test_surface_events_deliver() {
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let events = SurfaceEvents::new(move |e| sink.lock().push(e));

        events.emit(SurfaceEvent::Ready);
        assert_eq!(*received.lock(), vec![SurfaceEvent::Ready]);
    }
}
