//! In-memory rendering surface.
//!
//! [`HeadlessSurface`] keeps the full state a real map would hold (sources,
//! layers, markers, popup, camera, cursor) without drawing anything, and
//! records every command it receives. A [`HeadlessProbe`] shares that state
//! so callers can observe it and inject user interaction.
//!
//! Commands issued after [`RenderSurface::destroy`] fail with
//! [`SurfaceError::Destroyed`] and are counted, which makes teardown-order
//! mistakes visible.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use geojson::FeatureCollection;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{
    ClusterOptions, Cursor, GridClusterIndex, LayerEvent, LayerKind, LayerSpec, MarkerId,
    MarkerSpec, PopupId, PopupSpec, RenderSurface, RenderedFeature, SourceSpec, SurfaceError,
    SurfaceEvent, SurfaceEvents, SurfaceFactory, SurfaceOptions,
};
use crate::entity::LngLat;

/// When a headless surface reports itself ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyMode {
    /// Raise `Ready` as soon as the surface is constructed.
    #[default]
    Immediate,
    /// Wait for [`HeadlessProbe::signal_ready`].
    Manual,
}

/// One recorded surface command.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    AddSource(String),
    AddLayer(String),
    SetSourceData { source: String, features: usize },
    CreateMarker(MarkerId),
    MoveMarker(MarkerId),
    RemoveMarker(MarkerId),
    Subscribe { layer: String, event: LayerEvent },
    EaseTo { center: LngLat, zoom: f64 },
    OpenPopup(PopupId),
    ClosePopup(PopupId),
    SetCursor(Cursor),
    Destroy,
}

#[derive(Debug)]
struct HeadlessSource {
    cluster: Option<ClusterOptions>,
    data: FeatureCollection,
}

#[derive(Debug, Default)]
struct HeadlessState {
    surfaces_created: usize,
    ops: Vec<SurfaceOp>,
    sources: HashMap<String, HeadlessSource>,
    layers: Vec<LayerSpec>,
    subscriptions: Vec<(String, LayerEvent)>,
    markers: HashMap<MarkerId, MarkerSpec>,
    popup: Option<(PopupId, PopupSpec)>,
    center: Option<LngLat>,
    zoom: f64,
    cursor: Cursor,
    destroyed: bool,
    rejected_after_destroy: usize,
    next_handle: u64,
    events: Option<SurfaceEvents>,
}

impl HeadlessState {
    /// Fail (and count the attempt) once the surface is destroyed.
    fn ensure_live(&mut self) -> Result<(), SurfaceError> {
        if self.destroyed {
            self.rejected_after_destroy += 1;
            debug!("Command rejected by destroyed surface");
            return Err(SurfaceError::Destroyed);
        }
        Ok(())
    }

    fn record(&mut self, op: SurfaceOp) {
        trace!(op = ?op, "Surface command");
        self.ops.push(op);
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }
}

/// An in-memory [`RenderSurface`].
#[derive(Debug)]
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
}

impl RenderSurface for HeadlessSurface {
    fn add_source(&mut self, source: SourceSpec) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        if state.sources.contains_key(&source.id) {
            return Err(SurfaceError::DuplicateSource(source.id));
        }
        state.record(SurfaceOp::AddSource(source.id.clone()));
        state.sources.insert(
            source.id,
            HeadlessSource {
                cluster: source.cluster,
                data: FeatureCollection {
                    bbox: None,
                    features: Vec::new(),
                    foreign_members: None,
                },
            },
        );
        Ok(())
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        if !state.sources.contains_key(&layer.source) {
            return Err(SurfaceError::UnknownSource(layer.source));
        }
        state.record(SurfaceOp::AddLayer(layer.id.clone()));
        state.layers.push(layer);
        Ok(())
    }

    fn set_source_data(
        &mut self,
        source: &str,
        data: FeatureCollection,
    ) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        let features = data.features.len();
        match state.sources.get_mut(source) {
            Some(entry) => entry.data = data,
            None => return Err(SurfaceError::UnknownSource(source.to_string())),
        }
        state.record(SurfaceOp::SetSourceData {
            source: source.to_string(),
            features,
        });
        Ok(())
    }

    fn create_marker(&mut self, marker: MarkerSpec) -> Result<MarkerId, SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        let id = MarkerId(state.next_handle());
        state.record(SurfaceOp::CreateMarker(id));
        state.markers.insert(id, marker);
        Ok(id)
    }

    fn move_marker(&mut self, marker: MarkerId, position: LngLat) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        match state.markers.get_mut(&marker) {
            Some(spec) => spec.position = position,
            None => return Err(SurfaceError::UnknownMarker(marker)),
        }
        state.record(SurfaceOp::MoveMarker(marker));
        Ok(())
    }

    fn remove_marker(&mut self, marker: MarkerId) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        if state.markers.remove(&marker).is_none() {
            return Err(SurfaceError::UnknownMarker(marker));
        }
        state.record(SurfaceOp::RemoveMarker(marker));
        Ok(())
    }

    fn subscribe(&mut self, layer: &str, event: LayerEvent) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        if state.layer(layer).is_none() {
            return Err(SurfaceError::UnknownLayer(layer.to_string()));
        }
        state.record(SurfaceOp::Subscribe {
            layer: layer.to_string(),
            event,
        });
        state.subscriptions.push((layer.to_string(), event));
        Ok(())
    }

    fn cluster_expansion_zoom(
        &self,
        source: &str,
        cluster_id: u64,
    ) -> BoxFuture<'static, Result<f64, SurfaceError>> {
        let mut state = self.state.lock();
        let result = state.ensure_live().and_then(|()| match state.sources.get(source) {
            None => Err(SurfaceError::UnknownSource(source.to_string())),
            Some(HeadlessSource { cluster: None, .. }) => {
                Err(SurfaceError::NotClustered(source.to_string()))
            }
            Some(HeadlessSource {
                cluster: Some(options),
                data,
            }) => GridClusterIndex::new(data, *options)
                .expansion_zoom(cluster_id)
                .ok_or(SurfaceError::UnknownCluster(cluster_id)),
        });
        future::ready(result).boxed()
    }

    fn ease_to(&mut self, center: LngLat, zoom: f64) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.record(SurfaceOp::EaseTo { center, zoom });
        state.center = Some(center);
        state.zoom = zoom;
        Ok(())
    }

    fn open_popup(&mut self, popup: PopupSpec) -> Result<PopupId, SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        let id = PopupId(state.next_handle());
        state.record(SurfaceOp::OpenPopup(id));
        state.popup = Some((id, popup));
        Ok(id)
    }

    fn close_popup(&mut self, popup: PopupId) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.record(SurfaceOp::ClosePopup(popup));
        if state.popup.as_ref().map(|(id, _)| *id) == Some(popup) {
            state.popup = None;
        }
        Ok(())
    }

    fn set_cursor(&mut self, cursor: Cursor) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.record(SurfaceOp::SetCursor(cursor));
        state.cursor = cursor;
        Ok(())
    }

    fn zoom(&self) -> f64 {
        self.state.lock().zoom
    }

    fn destroy(&mut self) {
        let mut state = self.state.lock();
        if state.ensure_live().is_err() {
            return;
        }
        state.record(SurfaceOp::Destroy);
        state.destroyed = true;
        state.markers.clear();
        state.sources.clear();
        state.layers.clear();
        state.subscriptions.clear();
        state.popup = None;
        state.events = None;
        debug!("Headless surface destroyed");
    }
}

/// Creates [`HeadlessSurface`]s that share state with one [`HeadlessProbe`].
#[derive(Debug)]
pub struct HeadlessSurfaceFactory {
    ready: ReadyMode,
    probe: HeadlessProbe,
}

impl HeadlessSurfaceFactory {
    /// Create a factory with the given readiness behaviour.
    pub fn new(ready: ReadyMode) -> Self {
        Self {
            ready,
            probe: HeadlessProbe::default(),
        }
    }

    /// Probe observing every surface this factory creates.
    pub fn probe(&self) -> HeadlessProbe {
        self.probe.clone()
    }
}

impl Default for HeadlessSurfaceFactory {
    fn default() -> Self {
        Self::new(ReadyMode::Immediate)
    }
}

impl SurfaceFactory for HeadlessSurfaceFactory {
    fn create(
        &self,
        options: &SurfaceOptions,
        events: SurfaceEvents,
    ) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        {
            let mut state = self.probe.state.lock();
            let surfaces_created = state.surfaces_created + 1;
            *state = HeadlessState {
                surfaces_created,
                center: Some(options.center),
                zoom: options.zoom,
                events: Some(events.clone()),
                ..HeadlessState::default()
            };
        }
        debug!(
            style = %options.style,
            center = %options.center,
            zoom = options.zoom,
            "Headless surface created"
        );

        if self.ready == ReadyMode::Immediate {
            events.emit(SurfaceEvent::Ready);
        }

        Ok(Box::new(HeadlessSurface {
            state: Arc::clone(&self.probe.state),
        }))
    }
}

/// Observer and input injector for headless surfaces.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessProbe {
    /// How many surfaces the factory has created.
    pub fn surfaces_created(&self) -> usize {
        self.state.lock().surfaces_created
    }

    /// Every command recorded so far.
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.state.lock().ops.clone()
    }

    /// Number of recorded commands matching `predicate`.
    pub fn count_ops(&self, predicate: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.state.lock().ops.iter().filter(|op| predicate(op)).count()
    }

    /// Forget the recorded commands (state is kept).
    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    /// Live markers.
    pub fn markers(&self) -> HashMap<MarkerId, MarkerSpec> {
        self.state.lock().markers.clone()
    }

    /// Number of features currently in `source`.
    pub fn source_len(&self, source: &str) -> Option<usize> {
        self.state
            .lock()
            .sources
            .get(source)
            .map(|s| s.data.features.len())
    }

    /// Ids of registered layers, in registration order.
    pub fn layer_ids(&self) -> Vec<String> {
        self.state.lock().layers.iter().map(|l| l.id.clone()).collect()
    }

    /// Whether `layer` has a subscription for `event`.
    pub fn is_subscribed(&self, layer: &str, event: LayerEvent) -> bool {
        self.state
            .lock()
            .subscriptions
            .iter()
            .any(|(l, e)| l == layer && *e == event)
    }

    /// The open popup, if any.
    pub fn popup(&self) -> Option<PopupSpec> {
        self.state.lock().popup.as_ref().map(|(_, p)| p.clone())
    }

    /// Camera center and zoom.
    pub fn camera(&self) -> (Option<LngLat>, f64) {
        let state = self.state.lock();
        (state.center, state.zoom)
    }

    /// Simulate the user zooming the map.
    pub fn set_zoom(&self, zoom: f64) {
        self.state.lock().zoom = zoom;
    }

    /// Current pointer style.
    pub fn cursor(&self) -> Cursor {
        self.state.lock().cursor
    }

    /// Whether the surface has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Commands that arrived after destroy.
    pub fn rejected_after_destroy(&self) -> usize {
        self.state.lock().rejected_after_destroy
    }

    /// Features of `layer` as rendered at the current zoom.
    ///
    /// Aggregate layers yield aggregates only, point layers yield the points
    /// not absorbed into an aggregate.
    pub fn rendered_features(&self, layer: &str) -> Vec<RenderedFeature> {
        let state = self.state.lock();
        let Some(spec) = state.layer(layer) else {
            return Vec::new();
        };
        let Some(source) = state.sources.get(&spec.source) else {
            return Vec::new();
        };

        let rendered = match source.cluster {
            Some(options) => GridClusterIndex::new(&source.data, options).features_at(state.zoom),
            None => GridClusterIndex::new(
                &source.data,
                ClusterOptions {
                    max_zoom: 0,
                    radius: 1,
                },
            )
            .features_at(f64::from(u8::MAX)),
        };

        rendered
            .into_iter()
            .filter(|f| match spec.kind {
                LayerKind::ClusterCircles | LayerKind::ClusterCount => f.cluster_id().is_some(),
                LayerKind::Points => f.cluster_id().is_none(),
            })
            .collect()
    }

    /// Raise the surface's ready signal.
    pub fn signal_ready(&self) {
        self.emit(SurfaceEvent::Ready);
    }

    /// Click a rendered feature of a subscribed layer.
    ///
    /// Returns `false` if the layer has no click subscription.
    pub fn click(&self, layer: &str, feature: RenderedFeature) -> bool {
        if !self.is_subscribed(layer, LayerEvent::Click) {
            return false;
        }
        self.emit(SurfaceEvent::Click {
            layer: layer.to_string(),
            feature,
        });
        true
    }

    /// Click a discrete marker.
    pub fn click_marker(&self, marker: MarkerId) -> bool {
        if !self.state.lock().markers.contains_key(&marker) {
            return false;
        }
        self.emit(SurfaceEvent::MarkerClick { marker });
        true
    }

    /// Move the pointer onto or off a subscribed layer.
    pub fn hover(&self, layer: &str, entering: bool) -> bool {
        if !self.is_subscribed(layer, LayerEvent::Hover) {
            return false;
        }
        let layer = layer.to_string();
        self.emit(if entering {
            SurfaceEvent::PointerEnter { layer }
        } else {
            SurfaceEvent::PointerLeave { layer }
        });
        true
    }

    fn emit(&self, event: SurfaceEvent) {
        let events = self.state.lock().events.clone();
        if let Some(events) = events {
            events.emit(event);
        }
    }
}
