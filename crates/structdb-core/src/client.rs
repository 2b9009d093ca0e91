//! # Query Client
//!
//! One request/response cycle per call:
//!
//! 1. map the query parameters to the flat payload, adding the cache
//!    manifest and the auth token
//! 2. post it through the `Transport`
//! 3. unpack `{data_dump, cache_dump}` and materialize every top-level token
//! 4. commit the newly built entities to the session cache
//!
//! A failed call leaves the session cache exactly as it was.

use crate::cache::EntityCache;
use crate::entity::AnyEntity;
use crate::materializer::{Materializer, RecordTable};
use crate::primitives::{CACHE_DUMP_KEY, DATA_DUMP_KEY};
use crate::query::{
    CalculatorTypesQuery, ComparatorsQuery, GenericsQuery, PropertiesQuery, PropertyTypesQuery,
    QueryParams, build_payload,
};
use crate::registry::PropertyTypeRegistry;
use crate::types::StructDbError;
use serde_json::Value;
use std::time::Instant;

/// HTTP status the server uses for success.
pub const STATUS_OK: u16 = 200;

// =============================================================================
// TRANSPORT
// =============================================================================

/// Raw response of one POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Something that can POST a JSON payload and return the raw response.
///
/// Implementations report connection-level failures as
/// `StructDbError::ConnectionFailed`; status handling is left to the client.
pub trait Transport {
    fn post(&self, url: &str, payload: &str) -> Result<TransportResponse, StructDbError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post(&self, url: &str, payload: &str) -> Result<TransportResponse, StructDbError> {
        (**self).post(url, payload)
    }
}

// =============================================================================
// QUERY CLIENT
// =============================================================================

/// Client for the structure/property database.
#[derive(Debug)]
pub struct QueryClient<T> {
    transport: T,
    base_url: String,
    token: String,
    cache: EntityCache,
}

impl<T: Transport> QueryClient<T> {
    /// Create a client with an empty session cache.
    ///
    /// A trailing `/` on `base_url` is dropped.
    pub fn new(transport: T, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            transport,
            base_url,
            token: token.into(),
            cache: EntityCache::new(),
        }
    }

    /// Seed the session cache, e.g. with the cache of an earlier client.
    ///
    /// The cache it replaces is dropped and releases its entities.
    #[must_use]
    pub fn with_cache(mut self, cache: EntityCache) -> Self {
        self.cache = cache;
        self
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The session cache.
    #[must_use]
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Drop every cached entity; the next queries fetch everything again.
    ///
    /// Entity bodies are released, which frees reference cycles. Entities
    /// returned by earlier queries read as unfilled afterwards.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    /// Hand back the session cache.
    #[must_use]
    pub fn into_cache(self) -> EntityCache {
        self.cache
    }

    /// Query prototype structures.
    pub fn query_generics(&mut self, query: &GenericsQuery) -> Result<Vec<AnyEntity>, StructDbError> {
        self.query(query)
    }

    /// Query properties.
    pub fn query_properties(
        &mut self,
        query: &PropertiesQuery,
    ) -> Result<Vec<AnyEntity>, StructDbError> {
        self.query(query)
    }

    /// Query property types.
    pub fn query_property_types(
        &mut self,
        query: &PropertyTypesQuery,
    ) -> Result<Vec<AnyEntity>, StructDbError> {
        self.query(query)
    }

    /// Query calculator types.
    pub fn query_calculator_types(
        &mut self,
        query: &CalculatorTypesQuery,
    ) -> Result<Vec<AnyEntity>, StructDbError> {
        self.query(query)
    }

    /// Query comparison types.
    pub fn query_comparators(
        &mut self,
        query: &ComparatorsQuery,
    ) -> Result<Vec<AnyEntity>, StructDbError> {
        self.query(query)
    }

    /// Fetch every property type into an immutable registry.
    pub fn load_property_types(&mut self) -> Result<PropertyTypeRegistry, StructDbError> {
        let query = PropertyTypesQuery {
            options: crate::query::QueryOptions {
                limit: u64::from(u32::MAX),
                offset: 0,
                verbose: false,
            },
            ..PropertyTypesQuery::default()
        };
        let entries = self.query_property_types(&query)?;
        Ok(PropertyTypeRegistry::from_entities(&entries))
    }

    /// Run any query and materialize its result.
    ///
    /// Every top-level `data_dump` item must be a reference token. Any other
    /// value fails the whole call with `MalformedReference` and leaves the
    /// session cache unchanged. A body that is not a well-formed envelope is
    /// logged and yields an empty result.
    pub fn query<Q: QueryParams>(&mut self, query: &Q) -> Result<Vec<AnyEntity>, StructDbError> {
        let verbose = query.options().verbose;
        let payload = build_payload(query, self.cache.manifest_json(), &self.token);
        let payload = serde_json::to_string(&payload)
            .map_err(|e| StructDbError::SerializationError(e.to_string()))?;
        let url = format!("{}{}", self.base_url, Q::ENDPOINT);

        let started = Instant::now();
        let response = self.transport.post(&url, &payload)?;
        let elapsed = started.elapsed().as_secs_f64();

        if response.status != STATUS_OK {
            return Err(StructDbError::TransportFailure {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let size_kb = kilobytes(response.body.len());
        if verbose {
            tracing::info!(
                "Response successful, size = {:.2} kB, time = {:.2} s",
                size_kb,
                elapsed
            );
        } else {
            tracing::debug!("Response from {}: {:.2} kB in {:.2} s", url, size_kb, elapsed);
        }

        let Some((data_dump, table)) = unpack_envelope(&response.body) else {
            return Ok(Vec::new());
        };

        let mut materializer = Materializer::new(&self.cache, &table);
        let entries = data_dump
            .iter()
            .map(|token| materializer.resolve_entity(token))
            .collect::<Result<Vec<_>, _>>()?;
        let staged = materializer.finish();
        let added = staged.len();
        self.cache.absorb(staged.into_entities());

        if verbose {
            tracing::info!("{} entries received", entries.len());
        }
        tracing::debug!("{} new entities cached, {} total", added, self.cache.len());
        Ok(entries)
    }
}

#[allow(clippy::float_arithmetic)]
fn kilobytes(len: usize) -> f64 {
    len as f64 / 1024.0
}

/// Decode the envelope. Anything that is not `{data_dump: [...], cache_dump: {...}}`
/// is reported and treated as an empty result.
fn unpack_envelope(body: &[u8]) -> Option<(Vec<Value>, RecordTable)> {
    let mut envelope: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Empty or invalid response: {}", e);
            return None;
        }
    };

    let data_dump = envelope.get_mut(DATA_DUMP_KEY).map(Value::take);
    let cache_dump = envelope.get_mut(CACHE_DUMP_KEY).map(Value::take);
    match (data_dump, cache_dump.and_then(RecordTable::from_value)) {
        (Some(Value::Array(items)), Some(table)) => Some((items, table)),
        _ => {
            tracing::warn!(
                "Empty or invalid response: missing {} or {}",
                DATA_DUMP_KEY,
                CACHE_DUMP_KEY
            );
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        calls: RefCell<Vec<(String, String)>>,
        response: TransportResponse,
    }

    impl Transport for Recorder {
        fn post(&self, url: &str, payload: &str) -> Result<TransportResponse, StructDbError> {
            self.calls
                .borrow_mut()
                .push((url.to_string(), payload.to_string()));
            Ok(self.response.clone())
        }
    }

    fn recorder(status: u16, body: &str) -> Recorder {
        Recorder {
            calls: RefCell::new(Vec::new()),
            response: TransportResponse {
                status,
                body: body.as_bytes().to_vec(),
            },
        }
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let transport = recorder(200, "{}");
        let client = QueryClient::new(&transport, "https://db.example/", "t");
        assert_eq!(client.base_url(), "https://db.example");
    }

    #[test]
    fn posts_to_endpoint_under_base_url() {
        let transport = recorder(200, r#"{"data_dump": [], "cache_dump": {}}"#);
        let mut client = QueryClient::new(&transport, "https://db.example", "t");
        let result = client.query_generics(&GenericsQuery::default());

        assert!(matches!(result, Ok(v) if v.is_empty()));
        let calls = transport.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "https://db.example/api/v1.0/generics");
    }

    #[test]
    fn non_ok_status_is_transport_failure() {
        let transport = recorder(403, "forbidden");
        let mut client = QueryClient::new(&transport, "https://db.example", "t");
        let result = client.query_comparators(&ComparatorsQuery::default());

        assert!(matches!(
            result,
            Err(StructDbError::TransportFailure { status: 403, ref body }) if body == "forbidden"
        ));
    }

    #[test]
    fn invalid_json_is_empty_result() {
        let transport = recorder(200, "<html>");
        let mut client = QueryClient::new(&transport, "https://db.example", "t");
        assert!(matches!(client.query_generics(&GenericsQuery::default()), Ok(v) if v.is_empty()));
    }

    #[test]
    fn response_size_keeps_fractional_kilobytes() {
        assert_eq!(format!("{:.2}", kilobytes(0)), "0.00");
        assert_eq!(format!("{:.2}", kilobytes(512)), "0.50");
        assert_eq!(format!("{:.2}", kilobytes(1536)), "1.50");
    }

    #[test]
    fn non_array_data_dump_is_empty_result() {
        let transport = recorder(200, r#"{"data_dump": {}, "cache_dump": {}}"#);
        let mut client = QueryClient::new(&transport, "https://db.example", "t");
        assert!(matches!(client.query_generics(&GenericsQuery::default()), Ok(v) if v.is_empty()));
    }
}
