//! Grid-based point clustering for the headless surface.
//!
//! Points are projected to normalized Web Mercator and bucketed, per zoom
//! level, into square cells whose side is the cluster radius in screen pixels
//! (256px tiles). A cell holding two or more points is rendered as one
//! aggregate; above `max_zoom` every point renders on its own.
//!
//! Aggregate ids encode the zoom level and cell, so an id stays resolvable
//! for exactly as long as the same points occupy that cell. Swapping the data
//! under a stale id makes it unresolvable rather than wrong.
//!
//! Cell coordinates are kept to 29 bits each. When `max_zoom` and `radius`
//! would need a finer grid than that, clustering stops at the deepest zoom
//! that still fits and points render individually beyond it.

use std::collections::HashMap;

use geojson::{FeatureCollection, JsonObject};
use serde_json::Value;

use super::{
    ClusterOptions, RenderedFeature, PROPERTY_CLUSTER, PROPERTY_CLUSTER_ID, PROPERTY_POINT_COUNT,
};
use crate::entity::LngLat;

const TILE_SIZE: f64 = 256.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;
const CELL_BITS: u32 = 29;
const CELL_MASK: u64 = (1 << CELL_BITS) - 1;

#[derive(Debug, Clone)]
struct IndexedPoint {
    position: LngLat,
    properties: JsonObject,
    x: f64,
    y: f64,
}

/// Clustering index over the point features of one source.
#[derive(Debug, Clone)]
pub struct GridClusterIndex {
    points: Vec<IndexedPoint>,
    options: ClusterOptions,
}

impl GridClusterIndex {
    /// Index the `Point` features of `collection`; other geometries are ignored.
    pub fn new(collection: &FeatureCollection, options: ClusterOptions) -> Self {
        let points = collection
            .features
            .iter()
            .filter_map(|feature| {
                let geometry = feature.geometry.as_ref()?;
                let geojson::Value::Point(coords) = &geometry.value else {
                    return None;
                };
                let position = LngLat::new(*coords.first()?, *coords.get(1)?);
                let (x, y) = project(position);
                Some(IndexedPoint {
                    position,
                    properties: feature.properties.clone().unwrap_or_default(),
                    x,
                    y,
                })
            })
            .collect();

        let radius = options.radius.max(1);
        Self {
            points,
            options: ClusterOptions {
                radius,
                max_zoom: deepest_zoom(options.max_zoom, radius),
            },
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the index holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Aggregates and lone points as rendered at `zoom`.
    pub fn features_at(&self, zoom: f64) -> Vec<RenderedFeature> {
        let zoom = zoom_level(zoom);
        if zoom > self.options.max_zoom {
            return self.points.iter().map(point_feature).collect();
        }

        let mut cells: HashMap<(u64, u64), Vec<&IndexedPoint>> = HashMap::new();
        let mut order: Vec<(u64, u64)> = Vec::new();
        for point in &self.points {
            let cell = self.cell(point, zoom);
            cells
                .entry(cell)
                .or_insert_with(|| {
                    order.push(cell);
                    Vec::new()
                })
                .push(point);
        }

        order
            .into_iter()
            .map(|cell| {
                let members = &cells[&cell];
                if members.len() == 1 {
                    point_feature(members[0])
                } else {
                    cluster_feature(encode(zoom, cell), members)
                }
            })
            .collect()
    }

    /// Zoom level at which the aggregate `cluster_id` breaks apart.
    ///
    /// Returns `None` if the id does not name an aggregate of the current data.
    pub fn expansion_zoom(&self, cluster_id: u64) -> Option<f64> {
        let (zoom, cell) = decode(cluster_id);
        if zoom > self.options.max_zoom {
            return None;
        }

        let members: Vec<&IndexedPoint> = self
            .points
            .iter()
            .filter(|p| self.cell(p, zoom) == cell)
            .collect();
        if members.len() < 2 {
            return None;
        }

        for next in (zoom + 1)..=self.options.max_zoom {
            let first = self.cell(members[0], next);
            if members.iter().any(|p| self.cell(p, next) != first) {
                return Some(next as f64);
            }
        }
        Some(self.options.max_zoom as f64 + 1.0)
    }

    fn cell(&self, point: &IndexedPoint, zoom: u8) -> (u64, u64) {
        let cells_per_axis = TILE_SIZE * 2f64.powi(zoom as i32) / self.options.radius as f64;
        (
            ((point.x * cells_per_axis).floor() as u64).min(CELL_MASK),
            ((point.y * cells_per_axis).floor() as u64).min(CELL_MASK),
        )
    }
}

/// Largest zoom up to `max_zoom` whose grid fits in `CELL_BITS` per axis.
fn deepest_zoom(max_zoom: u8, radius: u32) -> u8 {
    let limit = (1u64 << CELL_BITS) as f64;
    let mut zoom = max_zoom;
    while zoom > 0 && TILE_SIZE * 2f64.powi(zoom as i32) / radius as f64 > limit {
        zoom -= 1;
    }
    zoom
}

fn zoom_level(zoom: f64) -> u8 {
    if zoom.is_finite() {
        zoom.floor().clamp(0.0, 63.0) as u8
    } else {
        0
    }
}

/// Normalized Web Mercator, both axes in `[0, 1]`.
fn project(position: LngLat) -> (f64, f64) {
    let x = ((position.lon + 180.0) / 360.0).clamp(0.0, 1.0);
    let lat = position
        .lat
        .clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT)
        .to_radians();
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0;
    (x, y.clamp(0.0, 1.0))
}

fn encode(zoom: u8, (cx, cy): (u64, u64)) -> u64 {
    ((zoom as u64) << (2 * CELL_BITS)) | (cx << CELL_BITS) | cy
}

fn decode(cluster_id: u64) -> (u8, (u64, u64)) {
    let zoom = (cluster_id >> (2 * CELL_BITS)) as u8;
    let cx = (cluster_id >> CELL_BITS) & CELL_MASK;
    let cy = cluster_id & CELL_MASK;
    (zoom, (cx, cy))
}

fn point_feature(point: &IndexedPoint) -> RenderedFeature {
    RenderedFeature {
        position: point.position,
        properties: point.properties.clone(),
    }
}

fn cluster_feature(cluster_id: u64, members: &[&IndexedPoint]) -> RenderedFeature {
    let count = members.len() as f64;
    let lon = members.iter().map(|p| p.position.lon).sum::<f64>() / count;
    let lat = members.iter().map(|p| p.position.lat).sum::<f64>() / count;

    let mut properties = JsonObject::new();
    properties.insert(PROPERTY_CLUSTER.to_string(), Value::Bool(true));
    properties.insert(PROPERTY_CLUSTER_ID.to_string(), Value::from(cluster_id));
    properties.insert(
        PROPERTY_POINT_COUNT.to_string(),
        Value::from(members.len() as u64),
    );

    RenderedFeature {
        position: LngLat::new(lon, lat),
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Snapshot};
    use chrono::Utc;

    fn collection(points: &[(&str, f64, f64)]) -> FeatureCollection {
        let entities = points
            .iter()
            .map(|(id, lon, lat)| Entity::new(*id, LngLat::new(*lon, *lat)))
            .collect();
        Snapshot::new(entities, Utc::now()).to_feature_collection()
    }

    fn downtown() -> FeatureCollection {
        // Two buses a few metres apart, one across the bay.
        collection(&[
            ("a", -117.1611, 32.7157),
            ("b", -117.1612, 32.7158),
            ("c", -117.2400, 32.6800),
        ])
    }

    #[test]
    fn test_nearby_points_cluster_at_low_zoom() {
        let index = GridClusterIndex::new(&downtown(), ClusterOptions::default());
        let rendered = index.features_at(3.0);

        assert_eq!(rendered.len(), 1, "everything collapses at zoom 3");
        assert_eq!(rendered[0].point_count(), Some(3));
    }

    #[test]
    fn test_points_render_individually_above_max_zoom() {
        let index = GridClusterIndex::new(&downtown(), ClusterOptions::default());
        let rendered = index.features_at(15.0);

        assert_eq!(rendered.len(), 3);
        assert!(rendered.iter().all(|f| f.cluster_id().is_none()));
    }

    #[test]
    fn test_expansion_zoom_splits_cluster() {
        let index = GridClusterIndex::new(&downtown(), ClusterOptions::default());
        let cluster = index.features_at(3.0).remove(0);
        let cluster_id = cluster.cluster_id().expect("aggregate");

        let expansion = index.expansion_zoom(cluster_id).expect("resolvable");
        assert!(expansion > 3.0);
        assert!(
            index.features_at(expansion).len() > 1,
            "aggregate must split at its expansion zoom"
        );
    }

    #[test]
    fn test_stale_cluster_id_unresolvable() {
        let index = GridClusterIndex::new(&downtown(), ClusterOptions::default());
        let cluster_id = index.features_at(3.0)[0].cluster_id().unwrap();

        let swapped = GridClusterIndex::new(&collection(&[]), ClusterOptions::default());
        assert_eq!(swapped.expansion_zoom(cluster_id), None);
    }

    #[test]
    fn test_fine_grid_does_not_wrap() {
        // Opposite sides of the globe must never share a cell.
        let points = collection(&[("west", -90.0, 0.0), ("east", 90.0, 0.0)]);
        let options = ClusterOptions {
            max_zoom: 22,
            radius: 1,
        };
        let index = GridClusterIndex::new(&points, options);

        for zoom in [21.0, 22.0] {
            let rendered = index.features_at(zoom);
            assert_eq!(rendered.len(), 2, "zoom {}", zoom);
            assert!(rendered.iter().all(|f| f.cluster_id().is_none()));
        }
    }

    #[test]
    fn test_deepest_zoom_respects_cell_width() {
        assert_eq!(deepest_zoom(22, 1), 21);
        assert_eq!(deepest_zoom(22, 2), 22);
        assert_eq!(deepest_zoom(14, 1), 14);
    }

    #[test]
    fn test_cluster_id_roundtrip() {
        let id = encode(12, (123_456, 654_321));
        assert_eq!(decode(id), (12, (123_456, 654_321)));
    }
}
