//! # Protocol Primitives
//!
//! Fixed endpoint paths and request defaults of the database API.

/// API version prefix shared by every endpoint.
pub const API_VERSION: &str = "/api/v1.0/";

/// Comparison types endpoint.
pub const COMPARATOR_URL: &str = "/api/v1.0/comparisontypes";

/// Properties endpoint.
pub const PROPERTIES_URL: &str = "/api/v1.0/properties";

/// Generic (prototype) structures endpoint.
pub const GENERIC_URL: &str = "/api/v1.0/generics";

/// Property types endpoint.
pub const PROPERTYTYPE_URL: &str = "/api/v1.0/propertytypes";

/// Calculator types endpoint.
pub const CALCULATORTYPE_URL: &str = "/api/v1.0/calculatortypes";

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 100;

/// Request key carrying the cache manifest.
pub const CACHE_STATE_KEY: &str = "cache_state";

/// Request key carrying the auth token.
pub const TOKEN_KEY: &str = "token";

/// Response key holding the top-level reference tokens.
pub const DATA_DUMP_KEY: &str = "data_dump";

/// Response key holding the full records.
pub const CACHE_DUMP_KEY: &str = "cache_dump";
