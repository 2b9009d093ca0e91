//! # structdb-core
//!
//! The response materialization engine of the structdb client - THE LOGIC.
//!
//! The database answers every query with a flat, deduplicated object graph:
//! top-level reference tokens (`data_dump`) plus a per-response table of full
//! records (`cache_dump`). This crate turns that into linked, typed entities
//! and keeps a session cache so repeated queries can tell the server which
//! entities need not be sent again.
//!
//! ## Components
//!
//! - `composition` - formula pattern -> element-count query compiler
//! - `cache` - session cache, at most one entity per `(kind, id)`
//! - `materializer` - reference-token resolution, cycle-safe
//! - `client` - one request/response cycle over a `Transport`
//!
//! ## Architectural Constraints
//!
//! - No async and no HTTP stack; the transport is injected
//! - Single-threaded: entities are `Rc`-shared and the cache is `!Send`
//! - Nothing persists beyond the process

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod client;
pub mod composition;
pub mod entity;
pub mod materializer;
pub mod model;
pub mod primitives;
pub mod query;
pub mod registry;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{ENTRY_TYPE_KEY, EntityId, EntityKey, EntityKind, StructDbError};

// =============================================================================
// RE-EXPORTS: Entity Model
// =============================================================================

pub use entity::{AnyEntity, Entity, Field, FieldSet, Link, Record};
pub use model::{
    Atoms, CalculatorType, ComparisonType, CoordinateFrame, GenericEntry, Property, PropertyType,
    StructureData, StructureEntry,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use cache::{EntityCache, Manifest};
pub use client::{QueryClient, Transport, TransportResponse};
pub use composition::{CompositionQuery, compile};
pub use materializer::{Materializer, RecordTable};
pub use query::{
    CalculatorTypesQuery, ComparatorsQuery, GenericsQuery, PropertiesQuery, PropertyTypesQuery,
    QueryOptions, QueryParams,
};
pub use registry::PropertyTypeRegistry;
