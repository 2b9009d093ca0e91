//! # Materializer Module
//!
//! Turns reference tokens into linked, typed entities.
//!
//! - One `Materializer` per response; it reads the response's `cache_dump`
//!   through a `RecordTable`
//! - The session cache is consulted read-only; entities built for this
//!   response are staged and handed back by `finish` for the caller to commit
//! - A shell is staged before its fields are resolved, so reference cycles
//!   resolve to the same instance instead of recursing forever

use crate::cache::EntityCache;
use crate::entity::{AnyEntity, Field, FieldSet};
use crate::model::Property;
use crate::types::{EntityKey, EntityKind, StructDbError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// =============================================================================
// RECORD TABLE
// =============================================================================

/// The flat per-response lookup table: kind -> id -> full record.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    kinds: Map<String, Value>,
}

impl RecordTable {
    /// Wrap a decoded `cache_dump` object.
    #[must_use]
    pub fn new(kinds: Map<String, Value>) -> Self {
        Self { kinds }
    }

    /// Wrap a decoded `cache_dump` value; anything but an object is `None`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(kinds) => Some(Self::new(kinds)),
            _ => None,
        }
    }

    /// The full record for `key`.
    ///
    /// Records are indexed by the string form of the id, as JSON object keys are.
    pub fn record(&self, key: &EntityKey) -> Result<&Map<String, Value>, StructDbError> {
        self.kinds
            .get(key.kind.as_str())
            .and_then(|ids| ids.get(key.id.to_string()))
            .and_then(Value::as_object)
            .ok_or_else(|| StructDbError::RecordNotFound(key.clone()))
    }
}

// =============================================================================
// MATERIALIZER
// =============================================================================

/// Resolves values against one response's record table.
#[derive(Debug)]
pub struct Materializer<'a> {
    session: &'a EntityCache,
    table: &'a RecordTable,
    staged: EntityCache,
}

impl<'a> Materializer<'a> {
    /// Create a materializer over a session cache and a response table.
    #[must_use]
    pub fn new(session: &'a EntityCache, table: &'a RecordTable) -> Self {
        Self {
            session,
            table,
            staged: EntityCache::new(),
        }
    }

    /// Resolve a reference token to its entity.
    ///
    /// Fails with `MalformedReference` if `token` is not a valid reference.
    pub fn resolve_entity(&mut self, token: &Value) -> Result<AnyEntity, StructDbError> {
        match EntityKey::from_token(token)? {
            Some(key) => self.entity(&key),
            None => Err(StructDbError::MalformedReference(format!(
                "expected a reference token, got {token}"
            ))),
        }
    }

    /// Resolve any value.
    ///
    /// Reference tokens become entities, sequences holding tokens are resolved
    /// element-wise, and everything else passes through unchanged.
    pub fn resolve(&mut self, value: &Value) -> Result<Field, StructDbError> {
        if let Some(key) = EntityKey::from_token(value)? {
            return self.entity(&key).map(Field::Entity);
        }
        match value {
            Value::Array(items) if items.iter().any(is_token) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Field::List),
            _ => Ok(Field::Value(value.clone())),
        }
    }

    /// Entities built so far, to be committed to the session cache.
    #[must_use]
    pub fn finish(self) -> EntityCache {
        self.staged
    }

    fn entity(&mut self, key: &EntityKey) -> Result<AnyEntity, StructDbError> {
        if let Some(existing) = self.session.get(key).or_else(|| self.staged.get(key)) {
            return Ok(existing.clone());
        }

        let table = self.table;
        let record = table.record(key)?;
        let shell = self.staged.get_or_create(key, || Ok(AnyEntity::shell(key.clone())))?;
        tracing::trace!("Materializing {}", key);

        let mut fields = FieldSet::new();
        for (name, value) in record {
            let field = if key.kind == EntityKind::Property
                && Property::MAPPING_FIELDS.contains(&name.as_str())
            {
                self.resolve_mapping(value)?
            } else {
                self.resolve(value)?
            };
            fields.insert(name.clone(), field);
        }
        shell.fill(fields);
        Ok(shell)
    }

    /// Resolve the values of a name-keyed mapping, keeping the mapping.
    fn resolve_mapping(&mut self, value: &Value) -> Result<Field, StructDbError> {
        let Value::Object(entries) = value else {
            return self.resolve(value);
        };
        let mut resolved = BTreeMap::new();
        for (name, item) in entries {
            resolved.insert(name.clone(), self.resolve(item)?);
        }
        Ok(Field::Map(resolved))
    }
}

fn is_token(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key(crate::types::ENTRY_TYPE_KEY))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CalculatorType, PropertyType, StructureEntry};
    use serde_json::json;

    fn table(value: Value) -> RecordTable {
        RecordTable::from_value(value).unwrap_or_default()
    }

    #[test]
    fn scalars_pass_through() {
        let cache = EntityCache::new();
        let table = RecordTable::default();
        let mut m = Materializer::new(&cache, &table);

        for value in [json!(1), json!("Al"), json!([1, 2]), json!({"a": 1})] {
            let field = m.resolve(&value);
            assert!(matches!(field, Ok(Field::Value(v)) if v == value));
        }
    }

    #[test]
    fn token_resolves_to_typed_entity() {
        let cache = EntityCache::new();
        let table = table(json!({
            "CalculatorType": {"5": {"NAME": "VASP", "SHORT_NAME": "vasp"}}
        }));
        let mut m = Materializer::new(&cache, &table);

        let entity = m.resolve_entity(&json!({"__entry_type": "CalculatorType", "id": 5}));
        let name = entity
            .ok()
            .and_then(|e| e.downcast::<CalculatorType>().cloned())
            .and_then(|c| c.get().and_then(|c| c.short_name.clone()));
        assert_eq!(name.as_deref(), Some("vasp"));
    }

    #[test]
    fn missing_record_is_record_not_found() {
        let cache = EntityCache::new();
        let table = table(json!({"Property": {}}));
        let mut m = Materializer::new(&cache, &table);

        let result = m.resolve_entity(&json!({"__entry_type": "Property", "id": 1}));
        assert!(matches!(result, Err(StructDbError::RecordNotFound(_))));
        assert!(m.finish().is_empty());
    }

    #[test]
    fn unknown_kind_inside_record_fails() {
        let cache = EntityCache::new();
        let table = table(json!({
            "PropertyType": {"1": {"NAME": "x", "OWNER": {"__entry_type": "Widget", "id": 1}}}
        }));
        let mut m = Materializer::new(&cache, &table);

        let result = m.resolve_entity(&json!({"__entry_type": "PropertyType", "id": 1}));
        assert!(matches!(result, Err(StructDbError::MalformedReference(_))));
    }

    #[test]
    fn shared_reference_resolves_to_one_instance() {
        let cache = EntityCache::new();
        let table = table(json!({
            "PropertyType": {"1": {"NAME": "elastic"}},
            "Property": {
                "10": {"NAME": "a", "TYPE": {"__entry_type": "PropertyType", "id": 1}},
                "11": {"NAME": "b", "TYPE": {"__entry_type": "PropertyType", "id": 1}}
            }
        }));
        let mut m = Materializer::new(&cache, &table);

        let a = m.resolve_entity(&json!({"__entry_type": "Property", "id": 10}));
        let b = m.resolve_entity(&json!({"__entry_type": "Property", "id": 11}));
        let type_of = |e: &Result<AnyEntity, StructDbError>| {
            e.as_ref()
                .ok()
                .and_then(|e| e.downcast::<Property>())
                .and_then(|p| p.get())
                .and_then(|p| p.property_type.clone())
        };
        let (ta, tb) = (type_of(&a), type_of(&b));
        assert!(matches!((ta, tb), (Some(x), Some(y)) if std::rc::Rc::ptr_eq(&x, &y)));
        assert_eq!(m.finish().count(EntityKind::PropertyType), 1);
    }

    #[test]
    fn children_and_structures_stay_mappings() {
        let cache = EntityCache::new();
        let table = table(json!({
            "Property": {
                "1": {
                    "NAME": "parent",
                    "CHILDREN": {"c11": {"__entry_type": "Property", "id": 2}},
                    "STRUCTURES": {"relaxed": {"__entry_type": "StructureEntry", "id": 3}}
                },
                "2": {"NAME": "child"}
            },
            "StructureEntry": {"3": {"COMPOSITION": "Al-1"}}
        }));
        let mut m = Materializer::new(&cache, &table);

        let parent = m
            .resolve_entity(&json!({"__entry_type": "Property", "id": 1}))
            .ok()
            .and_then(|e| e.downcast::<Property>().cloned());
        let parent = parent.as_ref().and_then(|p| p.get());

        let child = parent.as_ref().and_then(|p| p.children.get("c11"));
        let child_name = child.and_then(|c| c.get()).and_then(|c| c.name.clone());
        assert_eq!(child_name.as_deref(), Some("child"));

        let structure = parent
            .as_ref()
            .and_then(|p| p.structures.get("relaxed"))
            .and_then(|s| s.downcast::<StructureEntry>());
        assert!(structure.is_some());
    }

    #[test]
    fn token_lists_are_resolved() {
        let cache = EntityCache::new();
        let table = table(json!({"PropertyType": {"1": {"NAME": "x"}, "2": {"NAME": "y"}}}));
        let mut m = Materializer::new(&cache, &table);

        let field = m.resolve(&json!([
            {"__entry_type": "PropertyType", "id": 1},
            {"__entry_type": "PropertyType", "id": 2}
        ]));
        let kinds: Option<Vec<EntityKind>> = match field {
            Ok(Field::List(items)) => items.iter().map(|f| f.as_entity().map(AnyEntity::kind)).collect(),
            _ => None,
        };
        assert_eq!(kinds, Some(vec![EntityKind::PropertyType; 2]));
    }

    #[test]
    fn session_entities_are_reused_without_reading_the_table() {
        let cache = EntityCache::new();
        let first = table(json!({"PropertyType": {"1": {"NAME": "x"}}}));
        let mut m = Materializer::new(&cache, &first);
        let original = m.resolve_entity(&json!({"__entry_type": "PropertyType", "id": 1}));
        let session = EntityCache::from_entities(m.finish().into_entities());

        let empty = RecordTable::default();
        let mut m = Materializer::new(&session, &empty);
        let again = m.resolve_entity(&json!({"__entry_type": "PropertyType", "id": 1}));

        assert!(matches!((original, again), (Ok(a), Ok(b)) if a.ptr_eq(&b)));
        assert!(m.finish().is_empty());
        let name = session
            .get(&EntityKey::new(EntityKind::PropertyType, 1))
            .and_then(|e| e.downcast::<PropertyType>())
            .and_then(|t| t.get())
            .and_then(|t| t.name.clone());
        assert_eq!(name.as_deref(), Some("x"));
    }
}
