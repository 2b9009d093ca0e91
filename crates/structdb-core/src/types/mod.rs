//! # Core Type Definitions
//!
//! This module contains the identifiers shared by every other module:
//! - Entity kinds and identifiers (`EntityKind`, `EntityId`, `EntityKey`)
//! - Reference-token recognition (`ENTRY_TYPE_KEY`, `EntityKey::from_token`)
//! - Error types (`StructDbError`)
//!
//! ## Ordering Guarantees
//!
//! `EntityKind`, `EntityId` and `EntityKey` implement `Ord` so that every map
//! keyed by them is a `BTreeMap` and everything emitted to the server (the cache
//! manifest in particular) comes out in the same order for the same state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Discriminator key that marks a JSON mapping as a reference token.
pub const ENTRY_TYPE_KEY: &str = "__entry_type";

/// Key carrying the identifier inside a reference token.
pub const ID_KEY: &str = "id";

// =============================================================================
// ENTITY KIND
// =============================================================================

/// The closed set of entity kinds the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A measured or computed property value.
    Property,
    /// A concrete crystal structure.
    StructureEntry,
    /// A prototype structure shared by many concrete structures.
    GenericEntry,
    /// Taxonomy entry naming a class of properties.
    PropertyType,
    /// The code or method that produced a property.
    CalculatorType,
    /// A way of comparing properties of one type.
    ComparisonType,
}

impl EntityKind {
    /// Every kind, in manifest order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Property,
        EntityKind::StructureEntry,
        EntityKind::GenericEntry,
        EntityKind::PropertyType,
        EntityKind::CalculatorType,
        EntityKind::ComparisonType,
    ];

    /// The wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Property => "Property",
            Self::StructureEntry => "StructureEntry",
            Self::GenericEntry => "GenericEntry",
            Self::PropertyType => "PropertyType",
            Self::CalculatorType => "CalculatorType",
            Self::ComparisonType => "ComparisonType",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = StructDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StructDbError::MalformedReference(format!("unknown entity kind '{s}'")))
    }
}

// =============================================================================
// ENTITY IDENTIFIER
// =============================================================================

/// Server-assigned identifier, unique within its kind.
///
/// The server uses integers for most kinds but the protocol does not promise
/// it, so textual ids are kept as-is. `Int(5)` and `Text("5")` are distinct
/// keys, exactly as the server distinguishes them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Integer identifier.
    Int(i64),
    /// Textual identifier.
    Text(String),
}

impl EntityId {
    /// Read an identifier from a JSON value. Only integers and strings qualify.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// The identifier as it is sent back in the cache manifest.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// =============================================================================
// ENTITY KEY (REFERENCE TOKEN)
// =============================================================================

/// The `(kind, id)` pair a reference token points at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    /// The entity kind.
    pub kind: EntityKind,
    /// The identifier within that kind.
    pub id: EntityId,
}

impl EntityKey {
    /// Create a new key.
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Recognise a reference token.
    ///
    /// Returns `Ok(None)` for anything that does not carry `ENTRY_TYPE_KEY`
    /// (plain values pass through materialization untouched). A value that
    /// carries the discriminator but names an unknown kind, or lacks a usable
    /// `id`, is a `MalformedReference`.
    pub fn from_token(value: &Value) -> Result<Option<Self>, StructDbError> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        let Some(discriminator) = object.get(ENTRY_TYPE_KEY) else {
            return Ok(None);
        };

        let kind_name = discriminator.as_str().ok_or_else(|| {
            StructDbError::MalformedReference(format!("non-string {ENTRY_TYPE_KEY}: {value}"))
        })?;
        let kind = kind_name.parse::<EntityKind>()?;

        let id = object
            .get(ID_KEY)
            .and_then(EntityId::from_json)
            .ok_or_else(|| {
                StructDbError::MalformedReference(format!("token without usable id: {value}"))
            })?;

        Ok(Some(Self { kind, id }))
    }

    /// Encode this key as a reference token.
    #[must_use]
    pub fn to_token(&self) -> Value {
        serde_json::json!({
            ENTRY_TYPE_KEY: self.kind.as_str(),
            ID_KEY: self.id.to_json(),
        })
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the structdb client.
///
/// Cache and materializer errors propagate unmodified through a query call;
/// none of them leaves partially built entities in the session cache.
#[derive(Debug, Error)]
pub enum StructDbError {
    /// The server answered with a non-success status.
    #[error("Invalid response (code {status}): {body}")]
    TransportFailure {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The server could not be reached at all.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A value carries the reference discriminator but is not a valid token.
    #[error("Malformed reference: {0}")]
    MalformedReference(String),

    /// A reference token points at a record the response does not contain.
    #[error("Record not found in response: {0}")]
    RecordNotFound(EntityKey),

    /// A structure uses a coordinate frame other than `relative`/`absolute`.
    #[error("Unknown coordinate frame: {0}")]
    UnknownCoordinateFrame(String),

    /// A structure lacks what is needed to build atoms from it.
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
