//! Discrete-marker sink.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::{ApplyReport, EntitySink, LayerRole, SinkMode};
use crate::entity::{Entity, EntityId, LngLat, Snapshot};
use crate::reconcile::Delta;
use crate::surface::{MarkerId, MarkerSpec, RenderSurface, SurfaceError};

#[derive(Debug)]
struct DisplayedMarker {
    handle: MarkerId,
    position: LngLat,
    entity: Entity,
}

/// Draws one marker per entity and moves it in place as the entity moves.
///
/// A marker is created when its id first appears and removed when the id
/// disappears. In between, position updates reuse the same handle.
#[derive(Debug, Default)]
pub struct MarkerSink {
    displayed: HashMap<EntityId, DisplayedMarker>,
    by_handle: HashMap<MarkerId, EntityId>,
}

impl MarkerSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marker handle of a displayed entity.
    pub fn handle(&self, id: &EntityId) -> Option<MarkerId> {
        self.displayed.get(id).map(|m| m.handle)
    }

    fn title(entity: &Entity) -> String {
        match &entity.label {
            Some(label) => format!("Route {}", label),
            None => format!("Vehicle {}", entity.id),
        }
    }

    fn add(
        &mut self,
        surface: &mut dyn RenderSurface,
        entity: &Entity,
    ) -> Result<(), SurfaceError> {
        let handle = surface.create_marker(MarkerSpec {
            position: entity.position,
            title: Self::title(entity),
        })?;
        self.by_handle.insert(handle, entity.id.clone());
        self.displayed.insert(
            entity.id.clone(),
            DisplayedMarker {
                handle,
                position: entity.position,
                entity: entity.clone(),
            },
        );
        Ok(())
    }

    /// Returns whether the marker moved.
    fn update(
        &mut self,
        surface: &mut dyn RenderSurface,
        entity: &Entity,
    ) -> Result<bool, SurfaceError> {
        let Some(marker) = self.displayed.get_mut(&entity.id) else {
            // Not displayed after an earlier create failure; try again.
            self.add(surface, entity)?;
            return Ok(true);
        };

        marker.entity = entity.clone();
        if marker.position == entity.position {
            return Ok(false);
        }
        surface.move_marker(marker.handle, entity.position)?;
        marker.position = entity.position;
        Ok(true)
    }

    fn remove(&mut self, surface: &mut dyn RenderSurface, id: &EntityId) -> Result<(), SurfaceError> {
        let Some(marker) = self.displayed.remove(id) else {
            return Ok(());
        };
        self.by_handle.remove(&marker.handle);
        surface.remove_marker(marker.handle)
    }
}

impl EntitySink for MarkerSink {
    fn mode(&self) -> SinkMode {
        SinkMode::Markers
    }

    fn install(&mut self, _surface: &mut dyn RenderSurface) -> Result<(), SurfaceError> {
        // Markers carry their own click handling; nothing to register.
        Ok(())
    }

    fn apply(
        &mut self,
        surface: &mut dyn RenderSurface,
        _snapshot: &Snapshot,
        delta: &Delta<'_>,
    ) -> Result<ApplyReport, SurfaceError> {
        let mut report = ApplyReport::default();

        for id in &delta.removed {
            match self.remove(surface, id) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    // The entry is gone either way; the handle is unusable.
                    warn!(entity = %id, error = %e, "Failed to remove marker");
                    report.removed += 1;
                    report.failed += 1;
                }
            }
        }

        for entity in &delta.added {
            match self.add(surface, entity) {
                Ok(()) => report.added += 1,
                Err(e) => {
                    warn!(entity = %entity.id, error = %e, "Failed to create marker");
                    report.failed += 1;
                }
            }
        }

        for entity in &delta.updated {
            report.updated += 1;
            match self.update(surface, entity) {
                Ok(true) => report.moved += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(entity = %entity.id, error = %e, "Failed to move marker");
                    report.failed += 1;
                }
            }
        }

        debug!(
            added = report.added,
            moved = report.moved,
            removed = report.removed,
            displayed = self.displayed.len(),
            "Markers reconciled"
        );
        Ok(report)
    }

    fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.displayed.get(id).map(|m| &m.entity)
    }

    fn entity_for_marker(&self, marker: MarkerId) -> Option<&Entity> {
        self.by_handle
            .get(&marker)
            .and_then(|id| self.entity(id))
    }

    fn layer_role(&self, _layer: &str) -> Option<LayerRole> {
        None
    }

    fn displayed_ids(&self) -> HashSet<EntityId> {
        self.displayed.keys().cloned().collect()
    }

    fn displayed_len(&self) -> usize {
        self.displayed.len()
    }

    fn teardown(&mut self, surface: &mut dyn RenderSurface) {
        let count = self.displayed.len();
        for (id, marker) in self.displayed.drain() {
            if let Err(e) = surface.remove_marker(marker.handle) {
                debug!(entity = %id, error = %e, "Marker already gone at teardown");
            }
        }
        self.by_handle.clear();
        debug!(count, "Markers torn down");
    }
}
