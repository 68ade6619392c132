//! Pointer interaction: surface events to semantic actions.
//!
//! | Event | Target | Action |
//! |-------|--------|--------|
//! | click | aggregate | resolve expansion zoom, then ease the camera in |
//! | click | point or marker | open a detail popup (closing the previous one) |
//! | pointer enter | aggregate or point layer | pointer cursor |
//! | pointer leave | aggregate or point layer | default cursor |
//!
//! Expansion zoom resolution is asynchronous. [`InteractionHandler::handle`]
//! hands the caller a [`PendingExpansion`] to drive; the result comes back
//! through [`InteractionHandler::complete_expansion`]. Only the most recent
//! aggregate tap moves the camera.

use std::fmt;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::entity::{Entity, LngLat};
use crate::sink::{EntitySink, LayerRole, SOURCE_ID};
use crate::surface::{
    Cursor, PopupId, PopupSpec, RenderSurface, RenderedFeature, SurfaceError, SurfaceEvent,
};

/// An aggregate tap waiting for its expansion zoom.
pub struct PendingExpansion {
    /// Request number; only the latest one is honoured.
    pub request: u64,
    /// Where the camera should go.
    pub center: LngLat,
    /// Resolves to the zoom at which the aggregate splits.
    pub resolve: BoxFuture<'static, Result<f64, SurfaceError>>,
}

impl fmt::Debug for PendingExpansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingExpansion")
            .field("request", &self.request)
            .field("center", &self.center)
            .finish_non_exhaustive()
    }
}

/// Translates pointer events into camera moves, popups and cursor hints.
#[derive(Debug)]
pub struct InteractionHandler {
    cluster_source: String,
    popup: Option<PopupId>,
    latest_request: u64,
}

impl Default for InteractionHandler {
    fn default() -> Self {
        Self::new(SOURCE_ID)
    }
}

impl InteractionHandler {
    /// Create a handler resolving aggregates against `cluster_source`.
    pub fn new(cluster_source: impl Into<String>) -> Self {
        Self {
            cluster_source: cluster_source.into(),
            popup: None,
            latest_request: 0,
        }
    }

    /// The currently open popup.
    pub fn open_popup(&self) -> Option<PopupId> {
        self.popup
    }

    /// React to one surface event.
    ///
    /// Returns a pending expansion when the event was an aggregate tap.
    pub fn handle(
        &mut self,
        event: &SurfaceEvent,
        sink: &dyn EntitySink,
        surface: &mut dyn RenderSurface,
    ) -> Option<PendingExpansion> {
        match event {
            SurfaceEvent::Click { layer, feature } => match sink.layer_role(layer) {
                Some(LayerRole::Aggregate) => self.expand(feature, surface),
                Some(LayerRole::Point) => {
                    let entity = feature.entity_id().and_then(|id| sink.entity(&id));
                    self.show_details(entity, surface);
                    None
                }
                None => None,
            },
            SurfaceEvent::MarkerClick { marker } => {
                self.show_details(sink.entity_for_marker(*marker), surface);
                None
            }
            SurfaceEvent::PointerEnter { layer } => {
                if sink.layer_role(layer).is_some() {
                    self.set_cursor(surface, Cursor::Pointer);
                }
                None
            }
            SurfaceEvent::PointerLeave { layer } => {
                if sink.layer_role(layer).is_some() {
                    self.set_cursor(surface, Cursor::Default);
                }
                None
            }
            SurfaceEvent::Ready => None,
        }
    }

    /// Apply a resolved expansion zoom.
    ///
    /// Returns whether the camera moved. Superseded requests and failed
    /// resolutions are no-ops.
    pub fn complete_expansion(
        &mut self,
        request: u64,
        center: LngLat,
        result: Result<f64, SurfaceError>,
        surface: &mut dyn RenderSurface,
    ) -> bool {
        if request != self.latest_request {
            debug!(request, latest = self.latest_request, "Superseded aggregate expansion");
            return false;
        }

        let zoom = match result {
            Ok(zoom) => zoom.max(surface.zoom()),
            Err(e) => {
                debug!(request, error = %e, "Aggregate no longer resolvable");
                return false;
            }
        };

        match surface.ease_to(center, zoom) {
            Ok(()) => {
                debug!(center = %center, zoom, "Expanded aggregate");
                true
            }
            Err(e) => {
                warn!(error = %e, "Camera move failed");
                false
            }
        }
    }

    /// Close any open popup.
    pub fn reset(&mut self, surface: &mut dyn RenderSurface) {
        if let Some(popup) = self.popup.take() {
            if let Err(e) = surface.close_popup(popup) {
                debug!(error = %e, "Popup already gone");
            }
        }
    }

    fn expand(
        &mut self,
        feature: &RenderedFeature,
        surface: &mut dyn RenderSurface,
    ) -> Option<PendingExpansion> {
        let cluster_id = feature.cluster_id()?;
        self.latest_request += 1;
        debug!(cluster_id, request = self.latest_request, "Aggregate tapped");

        Some(PendingExpansion {
            request: self.latest_request,
            center: feature.position,
            resolve: surface.cluster_expansion_zoom(&self.cluster_source, cluster_id),
        })
    }

    fn show_details(&mut self, entity: Option<&Entity>, surface: &mut dyn RenderSurface) {
        let Some(entity) = entity else {
            debug!("Tap on an entity that is no longer displayed");
            return;
        };

        self.reset(surface);
        match surface.open_popup(popup_for(entity)) {
            Ok(popup) => self.popup = Some(popup),
            Err(e) => warn!(entity = %entity.id, error = %e, "Failed to open popup"),
        }
    }

    fn set_cursor(&self, surface: &mut dyn RenderSurface, cursor: Cursor) {
        if let Err(e) = surface.set_cursor(cursor) {
            debug!(error = %e, "Cursor update failed");
        }
    }
}

/// Popup content for an entity: id heading, label, then attributes by key.
pub fn popup_for(entity: &Entity) -> PopupSpec {
    let mut lines = Vec::with_capacity(entity.attributes.len() + 1);
    if let Some(label) = &entity.label {
        lines.push(format!("Route {}", label));
    }
    for (key, value) in &entity.attributes {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("{}: {}", key, value));
    }

    PopupSpec {
        position: entity.position,
        entity_id: entity.id.clone(),
        title: format!("Vehicle {}", entity.id),
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityId, Snapshot};
    use crate::reconcile::diff;
    use crate::sink::{ClusterSink, MarkerSink, CLUSTER_LAYER, POINT_LAYER};
    use crate::sink::test_support::headless;
    use crate::surface::{ClusterOptions, HeadlessProbe, MarkerId, SurfaceOp};
    use chrono::Utc;

    fn fleet() -> Snapshot {
        Snapshot::new(
            vec![
                Entity::new("1042", LngLat::new(-117.1611, 32.7157))
                    .with_label("7")
                    .with_attribute("speed", 12.5),
                Entity::new("1043", LngLat::new(-117.1612, 32.7158)),
                Entity::new("2001", LngLat::new(-116.5, 33.2)).with_label("901"),
            ],
            Utc::now(),
        )
    }

    fn clustered() -> (Box<dyn RenderSurface>, HeadlessProbe, ClusterSink) {
        let (mut surface, probe) = headless();
        let mut sink = ClusterSink::new(ClusterOptions::default());
        sink.install(surface.as_mut()).unwrap();
        let snapshot = fleet();
        let delta = diff(&sink.displayed_ids(), &snapshot);
        sink.apply(surface.as_mut(), &snapshot, &delta).unwrap();
        (surface, probe, sink)
    }

    fn click(layer: &str, feature: RenderedFeature) -> SurfaceEvent {
        SurfaceEvent::Click {
            layer: layer.to_string(),
            feature,
        }
    }

    #[tokio::test]
    async fn test_aggregate_tap_moves_camera_once() {
        let (mut surface, probe, sink) = clustered();
        probe.set_zoom(8.0);
        let cluster = probe.rendered_features(CLUSTER_LAYER).remove(0);

        let mut handler = InteractionHandler::default();
        let pending = handler
            .handle(&click(CLUSTER_LAYER, cluster), &sink, surface.as_mut())
            .expect("aggregate tap");
        let result = pending.resolve.await;
        probe.clear_ops();

        assert!(handler.complete_expansion(pending.request, pending.center, result, surface.as_mut()));

        let moves: Vec<_> = probe
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::EaseTo { zoom, .. } => Some(zoom),
                _ => None,
            })
            .collect();
        assert_eq!(moves.len(), 1);
        assert!(moves[0] >= 8.0);
    }

    #[test]
    fn test_expansion_never_zooms_out() {
        let (mut surface, probe, _sink) = clustered();
        probe.set_zoom(12.0);
        let mut handler = InteractionHandler::default();
        handler.latest_request = 1;

        assert!(handler.complete_expansion(1, LngLat::new(0.0, 0.0), Ok(9.0), surface.as_mut()));
        assert_eq!(probe.camera().1, 12.0);
    }

    #[test]
    fn test_only_latest_expansion_is_honoured() {
        let (mut surface, probe, _sink) = clustered();
        let mut handler = InteractionHandler::default();
        handler.latest_request = 2;
        probe.clear_ops();

        assert!(!handler.complete_expansion(1, LngLat::new(0.0, 0.0), Ok(15.0), surface.as_mut()));
        assert!(!handler.complete_expansion(
            2,
            LngLat::new(0.0, 0.0),
            Err(SurfaceError::UnknownCluster(3)),
            surface.as_mut()
        ));
        assert!(probe.ops().is_empty());
    }

    #[test]
    fn test_point_tap_opens_single_popup() {
        let (mut surface, probe, sink) = clustered();
        probe.set_zoom(16.0);
        let points = probe.rendered_features(POINT_LAYER);
        assert_eq!(points.len(), 3);

        let mut handler = InteractionHandler::default();
        for point in points {
            handler.handle(&click(POINT_LAYER, point), &sink, surface.as_mut());
        }

        let opened = probe.count_ops(|op| matches!(op, SurfaceOp::OpenPopup(_)));
        let closed = probe.count_ops(|op| matches!(op, SurfaceOp::ClosePopup(_)));
        assert_eq!(opened, 3);
        assert_eq!(closed, 2, "each new popup closes the previous one");
        assert!(probe.popup().is_some());
    }

    #[test]
    fn test_popup_content() {
        let popup = popup_for(&fleet().entities()[0]);
        assert_eq!(popup.entity_id, EntityId::from("1042"));
        assert_eq!(popup.text(), "Vehicle 1042\nRoute 7\nspeed: 12.5");
    }

    #[test]
    fn test_stale_point_tap_is_noop() {
        let (mut surface, probe, sink) = clustered();
        let mut properties = geojson::JsonObject::new();
        properties.insert("id".to_string(), Value::from("gone"));
        let stale = RenderedFeature {
            position: LngLat::new(0.0, 0.0),
            properties,
        };

        let mut handler = InteractionHandler::default();
        handler.handle(&click(POINT_LAYER, stale), &sink, surface.as_mut());
        assert!(probe.popup().is_none());
    }

    #[test]
    fn test_marker_tap_opens_popup() {
        let (mut surface, probe) = headless();
        let mut sink = MarkerSink::new();
        let snapshot = fleet();
        let delta = diff(&sink.displayed_ids(), &snapshot);
        sink.apply(surface.as_mut(), &snapshot, &delta).unwrap();

        let handle = sink.handle(&EntityId::from("2001")).unwrap();
        let mut handler = InteractionHandler::default();
        handler.handle(&SurfaceEvent::MarkerClick { marker: handle }, &sink, surface.as_mut());
        assert_eq!(probe.popup().unwrap().title, "Vehicle 2001");

        handler.handle(
            &SurfaceEvent::MarkerClick { marker: MarkerId(999) },
            &sink,
            surface.as_mut(),
        );
        assert_eq!(probe.popup().unwrap().title, "Vehicle 2001");
    }

    #[test]
    fn test_hover_toggles_cursor() {
        let (mut surface, probe, sink) = clustered();
        let mut handler = InteractionHandler::default();

        handler.handle(
            &SurfaceEvent::PointerEnter {
                layer: CLUSTER_LAYER.to_string(),
            },
            &sink,
            surface.as_mut(),
        );
        assert_eq!(probe.cursor(), Cursor::Pointer);

        handler.handle(
            &SurfaceEvent::PointerLeave {
                layer: CLUSTER_LAYER.to_string(),
            },
            &sink,
            surface.as_mut(),
        );
        assert_eq!(probe.cursor(), Cursor::Default);
    }

    #[test]
    fn test_reset_closes_popup() {
        let (mut surface, probe, sink) = clustered();
        probe.set_zoom(16.0);
        let point = probe.rendered_features(POINT_LAYER).remove(0);
        let mut handler = InteractionHandler::default();
        handler.handle(&click(POINT_LAYER, point), &sink, surface.as_mut());

        handler.reset(surface.as_mut());
        assert!(probe.popup().is_none());
        assert!(handler.open_popup().is_none());
    }
}
