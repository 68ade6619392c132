//! Clustered point-layer sink.
//!
//! All entities live in one clustered GeoJSON source. Each snapshot replaces
//! the source data in a single command, so the surface never shows a half
//! applied state; aggregation is left to the surface's clustering index.
//!
//! ```text
//! source "vehicles" (clustered)
//!   ├── layer "vehicle-clusters"       aggregate circles   (click, hover)
//!   ├── layer "vehicle-cluster-count"  aggregate labels
//!   └── layer "vehicle-points"         lone vehicles       (click, hover)
//! ```

use std::collections::{HashMap, HashSet};

use geojson::FeatureCollection;
use tracing::{debug, info};

use super::{ApplyReport, EntitySink, LayerRole, SinkMode};
use crate::entity::{Entity, EntityId, Snapshot};
use crate::reconcile::Delta;
use crate::surface::{
    ClusterOptions, LayerEvent, LayerKind, LayerSpec, MarkerId, RenderSurface, SourceSpec,
    SurfaceError,
};

/// Id of the clustered vehicle source.
pub const SOURCE_ID: &str = "vehicles";
/// Layer drawing aggregate circles.
pub const CLUSTER_LAYER: &str = "vehicle-clusters";
/// Layer drawing aggregate member counts.
pub const CLUSTER_COUNT_LAYER: &str = "vehicle-cluster-count";
/// Layer drawing unclustered vehicles.
pub const POINT_LAYER: &str = "vehicle-points";

/// Draws entities through one clustered source.
#[derive(Debug)]
pub struct ClusterSink {
    options: ClusterOptions,
    displayed: HashMap<EntityId, Entity>,
    installed: bool,
}

impl ClusterSink {
    /// Create a sink clustering with `options`.
    pub fn new(options: ClusterOptions) -> Self {
        Self {
            options,
            displayed: HashMap::new(),
            installed: false,
        }
    }

    /// Clustering parameters.
    pub fn options(&self) -> ClusterOptions {
        self.options
    }
}

impl EntitySink for ClusterSink {
    fn mode(&self) -> SinkMode {
        SinkMode::Clustered
    }

    fn install(&mut self, surface: &mut dyn RenderSurface) -> Result<(), SurfaceError> {
        surface.add_source(SourceSpec {
            id: SOURCE_ID.to_string(),
            cluster: Some(self.options),
        })?;

        for (id, kind) in [
            (CLUSTER_LAYER, LayerKind::ClusterCircles),
            (CLUSTER_COUNT_LAYER, LayerKind::ClusterCount),
            (POINT_LAYER, LayerKind::Points),
        ] {
            surface.add_layer(LayerSpec {
                id: id.to_string(),
                source: SOURCE_ID.to_string(),
                kind,
            })?;
        }

        for layer in [CLUSTER_LAYER, POINT_LAYER] {
            surface.subscribe(layer, LayerEvent::Click)?;
            surface.subscribe(layer, LayerEvent::Hover)?;
        }

        self.installed = true;
        info!(
            source = SOURCE_ID,
            max_zoom = self.options.max_zoom,
            radius = self.options.radius,
            "Clustered vehicle layers installed"
        );
        Ok(())
    }

    fn apply(
        &mut self,
        surface: &mut dyn RenderSurface,
        snapshot: &Snapshot,
        delta: &Delta<'_>,
    ) -> Result<ApplyReport, SurfaceError> {
        let data = snapshot.to_feature_collection();
        surface.set_source_data(SOURCE_ID, data)?;

        let moved = delta
            .updated
            .iter()
            .filter(|e| {
                self.displayed
                    .get(&e.id)
                    .is_some_and(|shown| shown.position != e.position)
            })
            .count();

        for id in &delta.removed {
            self.displayed.remove(id);
        }
        for entity in delta.added.iter().chain(delta.updated.iter()) {
            self.displayed.insert(entity.id.clone(), (*entity).clone());
        }

        let report = ApplyReport {
            added: delta.added.len(),
            updated: delta.updated.len(),
            moved,
            removed: delta.removed.len(),
            failed: 0,
        };
        debug!(
            features = self.displayed.len(),
            added = report.added,
            removed = report.removed,
            "Cluster source replaced"
        );
        Ok(report)
    }

    fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.displayed.get(id)
    }

    fn entity_for_marker(&self, _marker: MarkerId) -> Option<&Entity> {
        None
    }

    fn layer_role(&self, layer: &str) -> Option<LayerRole> {
        match layer {
            CLUSTER_LAYER | CLUSTER_COUNT_LAYER => Some(LayerRole::Aggregate),
            POINT_LAYER => Some(LayerRole::Point),
            _ => None,
        }
    }

    fn displayed_ids(&self) -> HashSet<EntityId> {
        self.displayed.keys().cloned().collect()
    }

    fn displayed_len(&self) -> usize {
        self.displayed.len()
    }

    fn teardown(&mut self, surface: &mut dyn RenderSurface) {
        if self.installed {
            let empty = FeatureCollection {
                bbox: None,
                features: Vec::new(),
                foreign_members: None,
            };
            if let Err(e) = surface.set_source_data(SOURCE_ID, empty) {
                debug!(error = %e, "Cluster source already gone at teardown");
            }
        }
        self.displayed.clear();
        self.installed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LngLat;
    use crate::reconcile::diff;
    use crate::sink::test_support::headless;
    use crate::surface::SurfaceOp;
    use chrono::Utc;
    use proptest::prelude::*;

    fn snapshot(entities: &[(&str, f64)]) -> Snapshot {
        Snapshot::new(
            entities
                .iter()
                .map(|(id, lon)| Entity::new(*id, LngLat::new(*lon, 32.7)))
                .collect(),
            Utc::now(),
        )
    }

    fn reconcile(
        sink: &mut ClusterSink,
        surface: &mut dyn RenderSurface,
        next: &Snapshot,
    ) -> ApplyReport {
        let delta = diff(&sink.displayed_ids(), next);
        sink.apply(surface, next, &delta).unwrap()
    }

    #[test]
    fn test_install_registers_source_and_layers() {
        let (mut surface, probe) = headless();
        let mut sink = ClusterSink::new(ClusterOptions::default());
        sink.install(surface.as_mut()).unwrap();

        assert_eq!(probe.source_len(SOURCE_ID), Some(0));
        assert_eq!(
            probe.layer_ids(),
            vec![CLUSTER_LAYER, CLUSTER_COUNT_LAYER, POINT_LAYER]
        );
        assert!(probe.is_subscribed(CLUSTER_LAYER, LayerEvent::Click));
        assert!(probe.is_subscribed(POINT_LAYER, LayerEvent::Hover));
        assert!(!probe.is_subscribed(CLUSTER_COUNT_LAYER, LayerEvent::Click));
    }

    #[test]
    fn test_each_snapshot_replaces_data_once() {
        let (mut surface, probe) = headless();
        let mut sink = ClusterSink::new(ClusterOptions::default());
        sink.install(surface.as_mut()).unwrap();
        probe.clear_ops();

        reconcile(&mut sink, surface.as_mut(), &snapshot(&[("a", 0.0), ("b", 1.0)]));
        let report = reconcile(&mut sink, surface.as_mut(), &snapshot(&[("b", 2.0), ("c", 3.0)]));

        assert_eq!((report.added, report.moved, report.removed), (1, 1, 1));
        assert_eq!(
            probe.ops(),
            vec![
                SurfaceOp::SetSourceData {
                    source: SOURCE_ID.to_string(),
                    features: 2
                },
                SurfaceOp::SetSourceData {
                    source: SOURCE_ID.to_string(),
                    features: 2
                },
            ]
        );
        assert!(sink.entity(&EntityId::from("a")).is_none());
        assert_eq!(
            sink.entity(&EntityId::from("b")).unwrap().position,
            LngLat::new(2.0, 32.7)
        );
    }

    #[test]
    fn test_duplicate_ids_render_once() {
        let (mut surface, probe) = headless();
        let mut sink = ClusterSink::new(ClusterOptions::default());
        sink.install(surface.as_mut()).unwrap();

        reconcile(&mut sink, surface.as_mut(), &snapshot(&[("a", 0.0), ("a", 5.0)]));
        assert_eq!(probe.source_len(SOURCE_ID), Some(1));
        assert_eq!(
            sink.entity(&EntityId::from("a")).unwrap().position.lon,
            5.0
        );
    }

    #[test]
    fn test_empty_snapshot_clears_points() {
        let (mut surface, probe) = headless();
        let mut sink = ClusterSink::new(ClusterOptions::default());
        sink.install(surface.as_mut()).unwrap();

        reconcile(&mut sink, surface.as_mut(), &snapshot(&[("a", 0.0)]));
        reconcile(&mut sink, surface.as_mut(), &snapshot(&[]));

        assert_eq!(probe.source_len(SOURCE_ID), Some(0));
        assert_eq!(sink.displayed_len(), 0);
    }

    #[test]
    fn test_layer_roles() {
        let sink = ClusterSink::new(ClusterOptions::default());
        assert_eq!(sink.layer_role(CLUSTER_LAYER), Some(LayerRole::Aggregate));
        assert_eq!(sink.layer_role(POINT_LAYER), Some(LayerRole::Point));
        assert_eq!(sink.layer_role("basemap"), None);
    }

    #[test]
    fn test_teardown_empties_source() {
        let (mut surface, probe) = headless();
        let mut sink = ClusterSink::new(ClusterOptions::default());
        sink.install(surface.as_mut()).unwrap();
        reconcile(&mut sink, surface.as_mut(), &snapshot(&[("a", 0.0)]));

        sink.teardown(surface.as_mut());
        assert_eq!(probe.source_len(SOURCE_ID), Some(0));
        assert!(sink.displayed_ids().is_empty());
    }

    proptest! {
        #[test]
        fn prop_source_matches_snapshot(
            sequence in prop::collection::vec(prop::collection::vec(0u8..6, 0..10), 1..6)
        ) {
            let (mut surface, probe) = headless();
            let mut sink = ClusterSink::new(ClusterOptions::default());
            sink.install(surface.as_mut()).unwrap();

            for ids in sequence {
                let next = Snapshot::new(
                    ids.iter()
                        .map(|id| Entity::new(format!("v{}", id), LngLat::new(*id as f64, 0.0)))
                        .collect(),
                    Utc::now(),
                );
                reconcile(&mut sink, surface.as_mut(), &next);

                prop_assert_eq!(sink.displayed_ids(), next.ids());
                prop_assert_eq!(probe.source_len(SOURCE_ID), Some(next.ids().len()));
            }
        }
    }
}
