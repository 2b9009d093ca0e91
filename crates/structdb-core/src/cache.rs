//! # Cache Module
//!
//! The two-tier session cache: kind -> id -> materialized entity.
//!
//! - At most one entity per `(kind, id)` for the lifetime of the cache
//! - Entries are never evicted implicitly; only `clear` removes them
//! - `manifest` is computed on demand from the current contents
//! - Clearing or dropping the cache releases the body of every entity it
//!   holds, so reference cycles between them are freed; handles kept past
//!   that point read as unfilled. `into_entities` hands entities over
//!   without releasing them
//!
//! Entities are `Rc`-shared, so the cache is neither `Send` nor `Sync`: the
//! shell-then-fill protocol of the materializer cannot race across threads.

use crate::entity::AnyEntity;
use crate::types::{EntityId, EntityKey, EntityKind, StructDbError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Ids currently cached, per kind.
pub type Manifest = BTreeMap<EntityKind, Vec<EntityId>>;

/// Session-level store of materialized entities.
#[derive(Debug, Default)]
pub struct EntityCache {
    entries: BTreeMap<EntityKind, BTreeMap<EntityId, AnyEntity>>,
}

impl EntityCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a cache from entities materialized earlier, typically the
    /// `into_entities` of another cache. Later duplicates of a key are ignored.
    pub fn from_entities(entities: impl IntoIterator<Item = AnyEntity>) -> Self {
        let mut cache = Self::new();
        cache.absorb(entities);
        cache
    }

    /// Look up an entity.
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&AnyEntity> {
        self.entries.get(&key.kind)?.get(&key.id)
    }

    /// Whether `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.get(key).is_some()
    }

    /// Return the cached entity for `key`, or build, store and return it.
    ///
    /// `make` runs at most once, and only when `key` is absent. If it fails,
    /// nothing is stored.
    pub fn get_or_create<F>(&mut self, key: &EntityKey, make: F) -> Result<AnyEntity, StructDbError>
    where
        F: FnOnce() -> Result<AnyEntity, StructDbError>,
    {
        if let Some(existing) = self.get(key) {
            return Ok(existing.clone());
        }
        let created = make()?;
        if created.key() != key {
            return Err(StructDbError::MalformedReference(format!(
                "built {} for {}",
                created.key(),
                key
            )));
        }
        self.entries
            .entry(key.kind)
            .or_default()
            .insert(key.id.clone(), created.clone());
        Ok(created)
    }

    /// Insert entities whose keys are not yet cached.
    pub fn absorb(&mut self, entities: impl IntoIterator<Item = AnyEntity>) {
        for entity in entities {
            let key = entity.key().clone();
            self.entries
                .entry(key.kind)
                .or_default()
                .entry(key.id)
                .or_insert(entity);
        }
    }

    /// Snapshot of every cached id, per kind.
    #[must_use]
    pub fn manifest(&self) -> Manifest {
        self.entries
            .iter()
            .map(|(kind, ids)| (*kind, ids.keys().cloned().collect()))
            .collect()
    }

    /// The manifest in its wire form, `{"<Kind>": [<id>, ...]}`.
    #[must_use]
    pub fn manifest_json(&self) -> Value {
        let state: Map<String, Value> = self
            .entries
            .iter()
            .map(|(kind, ids)| {
                let ids = ids.keys().map(EntityId::to_json).collect();
                (kind.as_str().to_string(), Value::Array(ids))
            })
            .collect();
        Value::Object(state)
    }

    /// Iterate every cached entity in `(kind, id)` order.
    pub fn iter(&self) -> impl Iterator<Item = &AnyEntity> + '_ {
        self.entries.values().flat_map(|ids| ids.values())
    }

    /// Number of cached entities of one kind.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries.get(&kind).map_or(0, BTreeMap::len)
    }

    /// Total number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every cached entity and release its body.
    pub fn clear(&mut self) {
        let mut held = 0;
        for entity in self.iter() {
            if !entity.release() {
                held += 1;
            }
        }
        if held > 0 {
            tracing::warn!("{} entities were borrowed during clear and kept their bodies", held);
        }
        self.entries.clear();
    }

    /// Empty the cache into a list of its entities, bodies intact.
    #[must_use]
    pub fn into_entities(mut self) -> Vec<AnyEntity> {
        std::mem::take(&mut self.entries)
            .into_values()
            .flat_map(BTreeMap::into_values)
            .collect()
    }
}

impl Drop for EntityCache {
    fn drop(&mut self) {
        self.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, FieldSet, Record};
    use crate::model::PropertyType;
    use serde_json::json;

    fn property_type(id: i64) -> AnyEntity {
        let key = EntityKey::new(EntityKind::PropertyType, id);
        AnyEntity::PropertyType(Entity::new(key, PropertyType::from_fields(FieldSet::new())))
    }

    #[test]
    fn get_or_create_runs_make_once() {
        let mut cache = EntityCache::new();
        let key = EntityKey::new(EntityKind::PropertyType, 1);
        let mut calls = 0;

        let first = cache.get_or_create(&key, || {
            calls += 1;
            Ok(property_type(1))
        });
        let second = cache.get_or_create(&key, || {
            calls += 1;
            Ok(property_type(1))
        });

        assert_eq!(calls, 1);
        assert!(matches!((first, second), (Ok(a), Ok(b)) if a.ptr_eq(&b)));
    }

    #[test]
    fn failed_make_stores_nothing() {
        let mut cache = EntityCache::new();
        let key = EntityKey::new(EntityKind::PropertyType, 1);
        let result = cache.get_or_create(&key, || Err(StructDbError::RecordNotFound(key.clone())));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let mut cache = EntityCache::new();
        let key = EntityKey::new(EntityKind::PropertyType, 1);
        let result = cache.get_or_create(&key, || Ok(property_type(2)));
        assert!(matches!(result, Err(StructDbError::MalformedReference(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn manifest_lists_each_id_once_in_order() {
        let mut cache = EntityCache::from_entities([property_type(3), property_type(1)]);
        cache.absorb([property_type(3), property_type(2)]);

        let manifest = cache.manifest();
        assert_eq!(
            manifest.get(&EntityKind::PropertyType),
            Some(&vec![EntityId::Int(1), EntityId::Int(2), EntityId::Int(3)])
        );
        assert_eq!(cache.manifest_json(), json!({"PropertyType": [1, 2, 3]}));
    }

    #[test]
    fn absorb_keeps_first_instance() {
        let original = property_type(1);
        let mut cache = EntityCache::from_entities([original.clone()]);
        cache.absorb([property_type(1)]);

        let key = EntityKey::new(EntityKind::PropertyType, 1);
        assert!(cache.get(&key).is_some_and(|e| e.ptr_eq(&original)));
        assert_eq!(cache.count(EntityKind::PropertyType), 1);
    }

    #[test]
    fn clear_empties_the_manifest() {
        let mut cache = EntityCache::from_entities([property_type(1)]);
        cache.clear();
        assert!(cache.manifest().is_empty());
        assert_eq!(cache.manifest_json(), json!({}));
    }

    #[test]
    fn clear_releases_kept_handles() {
        let kept = property_type(1);
        let mut cache = EntityCache::from_entities([kept.clone()]);
        assert!(kept.is_filled());

        cache.clear();
        assert!(!kept.is_filled());
    }

    #[test]
    fn drop_releases_kept_handles() {
        let kept = property_type(1);
        drop(EntityCache::from_entities([kept.clone()]));
        assert!(!kept.is_filled());
    }

    #[test]
    fn into_entities_keeps_bodies() {
        let kept = property_type(1);
        let cache = EntityCache::from_entities([property_type(2), kept.clone()]);

        let entities = cache.into_entities();
        assert_eq!(entities.len(), 2);
        assert!(entities.iter().all(AnyEntity::is_filled));
        assert!(entities[0].ptr_eq(&kept));
    }
}
