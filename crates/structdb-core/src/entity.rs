//! # Entity Module
//!
//! Shared, write-once handles around typed records.
//!
//! An entity is registered as an empty shell before its fields are resolved
//! and is filled exactly once afterwards. A reference that loops back to an
//! entity still being filled therefore receives the same handle, whose body is
//! not yet set at that moment; once the outermost construction returns, every
//! handle in the graph observes the filled body.
//!
//! Bodies hold strong links, so a reference cycle keeps its members alive.
//! The cache that owns an entity releases its body when the cache is cleared
//! or dropped, which breaks every cycle running through it.

use crate::types::{EntityId, EntityKey, EntityKind};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// ENTITY HANDLE
// =============================================================================

/// Shared handle to a materialized entity of record type `T`.
pub type Link<T> = Rc<Entity<T>>;

/// A materialized entity: its key and a write-once, releasable body.
pub struct Entity<T> {
    key: EntityKey,
    body: RefCell<Option<T>>,
}

impl<T> Entity<T> {
    /// Create an unfilled shell for `key`.
    pub(crate) fn shell(key: EntityKey) -> Link<T> {
        Rc::new(Self {
            key,
            body: RefCell::new(None),
        })
    }

    /// Create an already filled entity.
    #[must_use]
    pub fn new(key: EntityKey, body: T) -> Link<T> {
        Rc::new(Self {
            key,
            body: RefCell::new(Some(body)),
        })
    }

    /// Fill the shell. A second fill is ignored; the first body wins.
    pub(crate) fn fill(&self, body: T) {
        match self.body.try_borrow_mut() {
            Ok(mut slot) if slot.is_none() => *slot = Some(body),
            _ => tracing::debug!("Ignoring second fill of {}", self.key),
        }
    }

    /// Drop the body and every link it holds. Returns `false` if the body is
    /// borrowed at the moment and was left in place.
    pub(crate) fn release(&self) -> bool {
        // The guard is gone before the body drops, so links reaching back
        // here find the cell free.
        let released = self.body.try_borrow_mut().map(|mut slot| slot.take());
        released.is_ok()
    }

    /// The `(kind, id)` key of this entity.
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// The server identifier of this entity.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.key.id
    }

    /// The record, or `None` while the entity is still being filled or after
    /// its cache released it.
    #[must_use]
    pub fn get(&self) -> Option<Ref<'_, T>> {
        let body = self.body.try_borrow().ok()?;
        Ref::filter_map(body, Option::as_ref).ok()
    }

    /// Whether the body is present.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.body.try_borrow().is_ok_and(|body| body.is_some())
    }
}

impl<T> fmt::Debug for Entity<T> {
    // Bodies may reference back to this entity, so only the key is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("key", &self.key)
            .field("filled", &self.is_filled())
            .finish()
    }
}

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// A typed record body for one entity kind.
pub trait Record: Sized {
    /// The kind this record belongs to.
    const KIND: EntityKind;

    /// Build the record from resolved fields. Unknown or mistyped keys are
    /// kept in the record's `extra` map.
    fn from_fields(fields: FieldSet) -> Self;

    /// Wrap a handle into the closed sum.
    fn wrap(link: Link<Self>) -> AnyEntity;

    /// Borrow the handle back out of the closed sum, if the kind matches.
    fn unwrap(entity: &AnyEntity) -> Option<&Link<Self>>;
}

// =============================================================================
// ANY ENTITY
// =============================================================================

/// A handle to an entity of any of the six kinds.
#[derive(Debug, Clone)]
pub enum AnyEntity {
    Property(Link<crate::model::Property>),
    StructureEntry(Link<crate::model::StructureEntry>),
    GenericEntry(Link<crate::model::GenericEntry>),
    PropertyType(Link<crate::model::PropertyType>),
    CalculatorType(Link<crate::model::CalculatorType>),
    ComparisonType(Link<crate::model::ComparisonType>),
}

impl AnyEntity {
    /// Create an unfilled shell of the kind named by `key`.
    pub(crate) fn shell(key: EntityKey) -> Self {
        match key.kind {
            EntityKind::Property => Self::Property(Entity::shell(key)),
            EntityKind::StructureEntry => Self::StructureEntry(Entity::shell(key)),
            EntityKind::GenericEntry => Self::GenericEntry(Entity::shell(key)),
            EntityKind::PropertyType => Self::PropertyType(Entity::shell(key)),
            EntityKind::CalculatorType => Self::CalculatorType(Entity::shell(key)),
            EntityKind::ComparisonType => Self::ComparisonType(Entity::shell(key)),
        }
    }

    /// Build the typed record for this shell's kind and fill it.
    pub(crate) fn fill(&self, fields: FieldSet) {
        match self {
            Self::Property(e) => e.fill(Record::from_fields(fields)),
            Self::StructureEntry(e) => e.fill(Record::from_fields(fields)),
            Self::GenericEntry(e) => e.fill(Record::from_fields(fields)),
            Self::PropertyType(e) => e.fill(Record::from_fields(fields)),
            Self::CalculatorType(e) => e.fill(Record::from_fields(fields)),
            Self::ComparisonType(e) => e.fill(Record::from_fields(fields)),
        }
    }

    /// Drop the body, see `Entity::release`.
    pub(crate) fn release(&self) -> bool {
        match self {
            Self::Property(e) => e.release(),
            Self::StructureEntry(e) => e.release(),
            Self::GenericEntry(e) => e.release(),
            Self::PropertyType(e) => e.release(),
            Self::CalculatorType(e) => e.release(),
            Self::ComparisonType(e) => e.release(),
        }
    }

    /// The `(kind, id)` key.
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        match self {
            Self::Property(e) => e.key(),
            Self::StructureEntry(e) => e.key(),
            Self::GenericEntry(e) => e.key(),
            Self::PropertyType(e) => e.key(),
            Self::CalculatorType(e) => e.key(),
            Self::ComparisonType(e) => e.key(),
        }
    }

    /// The entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.key().kind
    }

    /// The server identifier.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.key().id
    }

    /// Whether the body has been filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        match self {
            Self::Property(e) => e.is_filled(),
            Self::StructureEntry(e) => e.is_filled(),
            Self::GenericEntry(e) => e.is_filled(),
            Self::PropertyType(e) => e.is_filled(),
            Self::CalculatorType(e) => e.is_filled(),
            Self::ComparisonType(e) => e.is_filled(),
        }
    }

    /// Identity comparison: true iff both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &AnyEntity) -> bool {
        match (self, other) {
            (Self::Property(a), Self::Property(b)) => Rc::ptr_eq(a, b),
            (Self::StructureEntry(a), Self::StructureEntry(b)) => Rc::ptr_eq(a, b),
            (Self::GenericEntry(a), Self::GenericEntry(b)) => Rc::ptr_eq(a, b),
            (Self::PropertyType(a), Self::PropertyType(b)) => Rc::ptr_eq(a, b),
            (Self::CalculatorType(a), Self::CalculatorType(b)) => Rc::ptr_eq(a, b),
            (Self::ComparisonType(a), Self::ComparisonType(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Borrow the typed handle if this entity is of record type `T`.
    #[must_use]
    pub fn downcast<T: Record>(&self) -> Option<&Link<T>> {
        T::unwrap(self)
    }
}

// =============================================================================
// RESOLVED FIELD VALUES
// =============================================================================

/// A record field after reference resolution.
#[derive(Debug, Clone)]
pub enum Field {
    /// Plain JSON that contained no reference token.
    Value(Value),
    /// A resolved reference.
    Entity(AnyEntity),
    /// A sequence that contained at least one reference token.
    List(Vec<Field>),
    /// A name-keyed mapping whose values were resolved individually.
    Map(BTreeMap<String, Field>),
}

impl Field {
    /// The plain JSON value, if this field holds one.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The resolved entity, if this field holds one.
    #[must_use]
    pub fn as_entity(&self) -> Option<&AnyEntity> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }
}

// =============================================================================
// FIELD SET
// =============================================================================

/// Resolved fields of one record, consumed slot by slot by `Record::from_fields`.
///
/// Every `take_*` method removes the key only when its value fits the
/// requested shape; anything left over ends up in the record's `extra` map.
#[derive(Debug, Default)]
pub struct FieldSet {
    fields: BTreeMap<String, Field>,
}

impl FieldSet {
    /// Create an empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolved field.
    pub fn insert(&mut self, key: impl Into<String>, field: Field) {
        self.fields.insert(key.into(), field);
    }

    /// Take a plain JSON value and deserialize it into `T`.
    ///
    /// JSON `null` is taken and reads as `None`.
    pub fn take_json<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = match self.fields.get(key) {
            Some(Field::Value(Value::Null)) => {
                self.fields.remove(key);
                return None;
            }
            Some(Field::Value(v)) => v.clone(),
            _ => return None,
        };
        match serde_json::from_value(value) {
            Ok(parsed) => {
                self.fields.remove(key);
                Some(parsed)
            }
            Err(e) => {
                tracing::debug!("Field {} kept untyped: {}", key, e);
                None
            }
        }
    }

    /// Take a plain JSON value as-is.
    pub fn take_value(&mut self, key: &str) -> Option<Value> {
        if !matches!(self.fields.get(key), Some(Field::Value(_))) {
            return None;
        }
        match self.fields.remove(key) {
            Some(Field::Value(v)) if !v.is_null() => Some(v),
            _ => None,
        }
    }

    /// Take a resolved reference of any kind.
    pub fn take_entity(&mut self, key: &str) -> Option<AnyEntity> {
        match self.fields.get(key) {
            Some(Field::Entity(e)) => {
                let entity = e.clone();
                self.fields.remove(key);
                Some(entity)
            }
            Some(Field::Value(Value::Null)) => {
                self.fields.remove(key);
                None
            }
            _ => None,
        }
    }

    /// Take a resolved reference of record type `T`.
    pub fn take_link<T: Record>(&mut self, key: &str) -> Option<Link<T>> {
        match self.fields.get(key) {
            Some(Field::Entity(e)) => {
                let link = T::unwrap(e).cloned()?;
                self.fields.remove(key);
                Some(link)
            }
            Some(Field::Value(Value::Null)) => {
                self.fields.remove(key);
                None
            }
            _ => None,
        }
    }

    /// Take any field without shape checks.
    pub fn take_field(&mut self, key: &str) -> Option<Field> {
        self.fields.remove(key)
    }

    /// Take a name-keyed mapping whose every value is an entity of type `T`.
    pub fn take_link_map<T: Record>(&mut self, key: &str) -> BTreeMap<String, Link<T>> {
        let Some(Field::Map(map)) = self.fields.get(key) else {
            return BTreeMap::new();
        };
        let typed: Option<BTreeMap<String, Link<T>>> = map
            .iter()
            .map(|(name, field)| {
                let link = field.as_entity().and_then(T::unwrap)?;
                Some((name.clone(), link.clone()))
            })
            .collect();
        match typed {
            Some(typed) => {
                self.fields.remove(key);
                typed
            }
            None => {
                tracing::debug!("Field {} kept untyped: mixed entity kinds", key);
                BTreeMap::new()
            }
        }
    }

    /// Take a name-keyed mapping whose every value is an entity of any kind.
    pub fn take_entity_map(&mut self, key: &str) -> BTreeMap<String, AnyEntity> {
        let Some(Field::Map(map)) = self.fields.get(key) else {
            return BTreeMap::new();
        };
        let typed: Option<BTreeMap<String, AnyEntity>> = map
            .iter()
            .map(|(name, field)| Some((name.clone(), field.as_entity()?.clone())))
            .collect();
        match typed {
            Some(typed) => {
                self.fields.remove(key);
                typed
            }
            None => {
                tracing::debug!("Field {} kept untyped: non-entity values", key);
                BTreeMap::new()
            }
        }
    }

    /// Hand over whatever was not taken.
    #[must_use]
    pub fn into_extra(self) -> BTreeMap<String, Field> {
        self.fields
    }
}

// =============================================================================
// TESTS
// =============================================================================
