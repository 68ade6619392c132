//! Positioned entities and the snapshots that carry them.
//!
//! An [`Entity`] is one trackable point (a vehicle, in practice). A
//! [`Snapshot`] is everything one poll of the positions feed returned. Both are
//! plain values: a new poll always produces a new snapshot, and nothing in the
//! engine mutates a snapshot after it has been shared.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use transithq::entity::{Entity, LngLat, Snapshot};
//!
//! let bus = Entity::new("MTS_1042", LngLat::new(-117.16, 32.71)).with_label("7");
//! let snapshot = Snapshot::new(vec![bus], Utc::now());
//!
//! assert_eq!(snapshot.len(), 1);
//! assert!(snapshot.ids().contains("MTS_1042"));
//! ```

mod snapshot;

pub use snapshot::{SequencedSnapshot, Snapshot};

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use geojson::{feature, Feature, Geometry, JsonObject};
use serde_json::Value;

/// Feature property carrying the entity identifier.
pub const PROPERTY_ID: &str = "id";

/// Feature property carrying the entity label.
pub const PROPERTY_LABEL: &str = "label";

/// Opaque per-entity metadata, passed through to interaction handling.
pub type Attributes = BTreeMap<String, Value>;

/// Stable identifier of an entity, unique within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    /// Create an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A WGS84 position in GeoJSON order (longitude first).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LngLat {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl LngLat {
    /// Create a position from longitude and latitude.
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Whether both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl fmt::Display for LngLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lon, self.lat)
    }
}

/// One trackable point.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Stable identifier.
    pub id: EntityId,
    /// Current position.
    pub position: LngLat,
    /// Display label (route short name for vehicles).
    pub label: Option<String>,
    /// Opaque metadata (bearing, speed, ...).
    pub attributes: Attributes,
}

impl Entity {
    /// Create an entity with no label and no attributes.
    pub fn new(id: impl Into<EntityId>, position: LngLat) -> Self {
        Self {
            id: id.into(),
            position,
            label: None,
            attributes: Attributes::new(),
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add one attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Convert to a GeoJSON point feature.
    ///
    /// Attributes are flattened into the feature properties; the `id` and
    /// `label` properties always reflect the entity itself.
    pub fn to_feature(&self) -> Feature {
        let mut properties = JsonObject::new();
        for (key, value) in &self.attributes {
            properties.insert(key.clone(), value.clone());
        }
        properties.insert(
            PROPERTY_ID.to_string(),
            Value::String(self.id.to_string()),
        );
        if let Some(label) = &self.label {
            properties.insert(PROPERTY_LABEL.to_string(), Value::String(label.clone()));
        }

        Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::Point(vec![
                self.position.lon,
                self.position.lat,
            ]))),
            id: Some(feature::Id::String(self.id.to_string())),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}
