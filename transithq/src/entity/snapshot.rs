//! Immutable poll results.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geojson::{FeatureCollection, JsonObject};
use serde_json::Value;

use super::{Entity, EntityId};

/// Everything one poll of the positions feed returned.
///
/// The entity list is kept exactly as the feed produced it, duplicates
/// included. Consumers that need one entity per id use
/// [`Snapshot::unique_entities`], where the last occurrence of an id wins.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entities: Vec<Entity>,
    retrieved_at: DateTime<Utc>,
    source_timestamp: Option<i64>,
    rejected: usize,
}

impl Snapshot {
    /// Create a snapshot from parsed entities.
    pub fn new(entities: Vec<Entity>, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            entities,
            retrieved_at,
            source_timestamp: None,
            rejected: 0,
        }
    }

    /// A snapshot with no entities.
    pub fn empty(retrieved_at: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), retrieved_at)
    }

    /// Attach the timestamp reported by the feed itself.
    pub fn with_source_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.source_timestamp = timestamp;
        self
    }

    /// Record how many feed elements were dropped while parsing.
    pub fn with_rejected(mut self, rejected: usize) -> Self {
        self.rejected = rejected;
        self
    }

    /// Entities in feed order, duplicates included.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of entities in feed order, duplicates included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the feed returned no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// When the engine retrieved this snapshot.
    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }

    /// Timestamp reported by the feed, if any.
    pub fn source_timestamp(&self) -> Option<i64> {
        self.source_timestamp
    }

    /// Feed elements dropped as malformed.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// One entity per id, ordered by first appearance.
    ///
    /// When an id appears more than once the last occurrence provides the
    /// entity data.
    pub fn unique_entities(&self) -> Vec<&Entity> {
        let mut slots: HashMap<&str, usize> = HashMap::with_capacity(self.entities.len());
        let mut unique: Vec<&Entity> = Vec::with_capacity(self.entities.len());

        for entity in &self.entities {
            match slots.entry(entity.id.as_str()) {
                Entry::Occupied(slot) => unique[*slot.get()] = entity,
                Entry::Vacant(slot) => {
                    slot.insert(unique.len());
                    unique.push(entity);
                }
            }
        }

        unique
    }

    /// The set of ids present in this snapshot.
    pub fn ids(&self) -> HashSet<EntityId> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }

    /// Convert to a GeoJSON FeatureCollection, one feature per unique id.
    ///
    /// The feed timestamp, when known, is carried as
    /// `properties.timestamp` on the collection.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .unique_entities()
            .into_iter()
            .map(Entity::to_feature)
            .collect();

        let foreign_members = self.source_timestamp.map(|ts| {
            let mut properties = JsonObject::new();
            properties.insert("timestamp".to_string(), Value::from(ts));
            let mut members = JsonObject::new();
            members.insert("properties".to_string(), Value::Object(properties));
            members
        });

        FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        }
    }
}

/// A snapshot tagged with the poll sequence number that produced it.
///
/// Sequence numbers increase with every retrieval the poller starts, so a
/// consumer can reject a result that resolves after a newer one.
#[derive(Debug, Clone)]
pub struct SequencedSnapshot {
    /// Poll sequence number (starts at 1).
    pub sequence: u64,
    /// The shared snapshot.
    pub snapshot: Arc<Snapshot>,
}

impl SequencedSnapshot {
    /// Pair a snapshot with its sequence number.
    pub fn new(sequence: u64, snapshot: Snapshot) -> Self {
        Self {
            sequence,
            snapshot: Arc::new(snapshot),
        }
    }
}
