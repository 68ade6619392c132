//! Decoding of positions feed bodies into snapshots.
//!
//! Two body shapes are accepted:
//!
//! ```text
//! { "timestamp": 1700000000,
//!   "vehicles": [ { "vehicleId": "1042", "routeShortName": "7",
//!                   "lat": 32.71, "lon": -117.16, "bearing": 90 } ] }
//!
//! { "type": "FeatureCollection",
//!   "properties": { "timestamp": 1700000000 },
//!   "features": [ { "type": "Feature",
//!                   "geometry": { "type": "Point", "coordinates": [-117.16, 32.71] },
//!                   "properties": { "vehicleId": "1042", "routeShortName": "7" } } ] }
//! ```
//!
//! The feed is untrusted. Elements that cannot become an entity are dropped
//! one by one and counted; the rest of the snapshot is still used.

use std::fmt;

use chrono::{DateTime, Utc};
use geojson::feature::Id;
use geojson::{Feature, Value as GeometryValue};
use serde_json::{Map, Value};
use tracing::debug;

use super::FeedError;
use crate::entity::{Attributes, Entity, LngLat, Snapshot};

const VEHICLE_ID_KEYS: &[&str] = &["vehicleId"];
const FEATURE_ID_KEYS: &[&str] = &["vehicleId", "id"];
const LABEL_KEYS: &[&str] = &["routeShortName", "label"];

type Decoder = fn(&Value) -> Result<Entity, Rejection>;

/// Why a feed element was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    NotAnObject,
    MissingId,
    MissingCoordinate(&'static str),
    NonFinite,
    NotAPoint,
    InvalidFeature,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotAnObject => write!(f, "element is not an object"),
            Rejection::MissingId => write!(f, "missing identifier"),
            Rejection::MissingCoordinate(name) => write!(f, "missing {}", name),
            Rejection::NonFinite => write!(f, "non-finite coordinates"),
            Rejection::NotAPoint => write!(f, "geometry is not a Point"),
            Rejection::InvalidFeature => write!(f, "not a GeoJSON Feature"),
        }
    }
}

/// Parse a feed body into a snapshot stamped with `retrieved_at`.
///
/// A body with neither a `vehicles` nor a `features` collection (absent or
/// `null`) is an empty snapshot. A body that is not a JSON object, or whose
/// collection is some other non-array value, is an error.
pub fn parse_snapshot(body: &[u8], retrieved_at: DateTime<Utc>) -> Result<Snapshot, FeedError> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| FeedError::Malformed(e.to_string()))?;
    let Value::Object(root) = root else {
        return Err(FeedError::Malformed("expected a JSON object".to_string()));
    };

    let timestamp = root.get("timestamp").and_then(Value::as_i64).or_else(|| {
        root.get("properties")
            .and_then(|p| p.get("timestamp"))
            .and_then(Value::as_i64)
    });

    let collection = |name: &str| root.get(name).filter(|v| !v.is_null());
    let (elements, decode) = if let Some(vehicles) = collection("vehicles") {
        (as_array(vehicles, "vehicles")?, decode_vehicle as Decoder)
    } else if let Some(features) = collection("features") {
        (as_array(features, "features")?, decode_feature as Decoder)
    } else {
        return Ok(Snapshot::empty(retrieved_at).with_source_timestamp(timestamp));
    };

    let mut entities = Vec::with_capacity(elements.len());
    let mut rejected = 0;
    for (index, element) in elements.iter().enumerate() {
        match decode(element) {
            Ok(entity) => entities.push(entity),
            Err(reason) => {
                rejected += 1;
                debug!(index, %reason, "Dropping malformed feed element");
            }
        }
    }

    Ok(Snapshot::new(entities, retrieved_at)
        .with_source_timestamp(timestamp)
        .with_rejected(rejected))
}

fn as_array<'a>(value: &'a Value, name: &str) -> Result<&'a Vec<Value>, FeedError> {
    value
        .as_array()
        .ok_or_else(|| FeedError::Malformed(format!("`{}` is not an array", name)))
}

fn decode_vehicle(value: &Value) -> Result<Entity, Rejection> {
    let object = value.as_object().ok_or(Rejection::NotAnObject)?;
    let id = first_id(object, VEHICLE_ID_KEYS).ok_or(Rejection::MissingId)?;
    let lon = number(object, "lon").ok_or(Rejection::MissingCoordinate("lon"))?;
    let lat = number(object, "lat").ok_or(Rejection::MissingCoordinate("lat"))?;

    let skip = ["vehicleId", "routeShortName", "lat", "lon"];
    build_entity(id, LngLat::new(lon, lat), first_label(object), object, &skip)
}

fn decode_feature(value: &Value) -> Result<Entity, Rejection> {
    if !value.is_object() {
        return Err(Rejection::NotAnObject);
    }
    let feature = Feature::try_from(value.clone()).map_err(|_| Rejection::InvalidFeature)?;

    let position = match feature.geometry.as_ref().map(|g| &g.value) {
        Some(GeometryValue::Point(coordinates)) => match coordinates.as_slice() {
            [lon, lat, ..] => LngLat::new(*lon, *lat),
            _ => return Err(Rejection::MissingCoordinate("coordinates")),
        },
        _ => return Err(Rejection::NotAPoint),
    };

    let properties = feature.properties.unwrap_or_default();
    let id = first_id(&properties, FEATURE_ID_KEYS)
        .or_else(|| match feature.id {
            Some(Id::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Id::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or(Rejection::MissingId)?;

    let skip = ["vehicleId", "id", "routeShortName", "label"];
    build_entity(id, position, first_label(&properties), &properties, &skip)
}

fn build_entity(
    id: String,
    position: LngLat,
    label: Option<String>,
    source: &Map<String, Value>,
    skip: &[&str],
) -> Result<Entity, Rejection> {
    if !position.is_finite() {
        return Err(Rejection::NonFinite);
    }

    let attributes: Attributes = source
        .iter()
        .filter(|(key, value)| !value.is_null() && !skip.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Entity {
        id: id.into(),
        position,
        label,
        attributes,
    })
}

fn first_id(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| object.get(*key).and_then(id_string))
}

fn first_label(object: &Map<String, Value>) -> Option<String> {
    LABEL_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(id_string))
}

/// Identifiers and labels may arrive as strings or bare numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(object: &Map<String, Value>, key: &str) -> Option<f64> {
    object.get(key).and_then(Value::as_f64)
}
