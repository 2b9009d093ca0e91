//! # Property Type Registry
//!
//! Immutable name -> property type lookup, built once from a query result and
//! passed around as data.
//!
//! Names are captured at build time. The linked types stay owned by the
//! client's session cache and read as unfilled once that cache is reset or
//! dropped.

use crate::entity::{AnyEntity, Link};
use crate::model::PropertyType;
use std::collections::BTreeMap;

/// Property types keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PropertyTypeRegistry {
    by_name: BTreeMap<String, Link<PropertyType>>,
}

impl PropertyTypeRegistry {
    /// Collect the named property types among `entities`.
    ///
    /// Entities of other kinds and unnamed types are skipped; on duplicate
    /// names the first one wins.
    #[must_use]
    pub fn from_entities(entities: &[AnyEntity]) -> Self {
        let mut by_name = BTreeMap::new();
        for link in entities.iter().filter_map(|e| e.downcast::<PropertyType>()) {
            let Some(name) = link.get().and_then(|t| t.name.clone()) else {
                continue;
            };
            by_name.entry(name).or_insert_with(|| link.clone());
        }
        Self { by_name }
    }

    /// Look up a property type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Link<PropertyType>> {
        self.by_name.get(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.by_name.keys().map(String::as_str)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Field, FieldSet, Record};
    use crate::model::CalculatorType;
    use crate::types::{EntityKey, EntityKind};
    use serde_json::json;

    fn named<T: Record>(kind: EntityKind, id: i64, name: Option<&str>) -> AnyEntity {
        let mut fields = FieldSet::new();
        if let Some(name) = name {
            fields.insert("NAME", Field::Value(json!(name)));
        }
        T::wrap(Entity::new(EntityKey::new(kind, id), T::from_fields(fields)))
    }

    #[test]
    fn keeps_only_named_property_types() {
        let entities = vec![
            named::<PropertyType>(EntityKind::PropertyType, 1, Some("elastic")),
            named::<PropertyType>(EntityKind::PropertyType, 2, None),
            named::<CalculatorType>(EntityKind::CalculatorType, 3, Some("vasp")),
            named::<PropertyType>(EntityKind::PropertyType, 4, Some("bulk")),
        ];
        let registry = PropertyTypeRegistry::from_entities(&entities);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["bulk", "elastic"]);
        assert!(registry.get("vasp").is_none());
    }

    #[test]
    fn first_duplicate_wins() {
        let entities = vec![
            named::<PropertyType>(EntityKind::PropertyType, 1, Some("elastic")),
            named::<PropertyType>(EntityKind::PropertyType, 2, Some("elastic")),
        ];
        let registry = PropertyTypeRegistry::from_entities(&entities);
        let id = registry.get("elastic").map(|t| t.id().clone());
        assert_eq!(id, Some(crate::types::EntityId::Int(1)));
    }
}
