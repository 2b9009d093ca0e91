//! # Query Module
//!
//! Parameter sets for the five query endpoints and the request payload they
//! map to.
//!
//! Every declared filter is always present in the payload: an absent filter
//! is sent as the empty string, never omitted.

use crate::primitives::{
    CACHE_STATE_KEY, CALCULATORTYPE_URL, COMPARATOR_URL, DEFAULT_LIMIT, GENERIC_URL,
    PROPERTIES_URL, PROPERTYTYPE_URL, TOKEN_KEY,
};
use crate::types::EntityId;
use serde_json::{Map, Value};

/// Pagination and reporting options shared by every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: u64,
    pub offset: u64,
    /// Log response size, timing and entry count at `info` level.
    pub verbose: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            verbose: true,
        }
    }
}

/// A parameter set for one endpoint.
pub trait QueryParams {
    /// Endpoint path, relative to the server base URL.
    const ENDPOINT: &'static str;

    /// Filters as `(name, value)`; names are sent as `param_<name>`.
    fn filters(&self) -> Vec<(&'static str, Value)>;

    /// Pagination and reporting options.
    fn options(&self) -> QueryOptions;
}

fn text(value: Option<&str>) -> Value {
    value.map_or_else(|| Value::from(""), Value::from)
}

/// Build the flat request payload for `query`.
pub fn build_payload<Q: QueryParams>(query: &Q, cache_state: Value, token: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    for (name, value) in query.filters() {
        payload.insert(format!("param_{name}"), value);
    }
    let options = query.options();
    payload.insert("param_limit".to_string(), Value::from(options.limit));
    payload.insert("param_offset".to_string(), Value::from(options.offset));
    payload.insert(CACHE_STATE_KEY.to_string(), cache_state);
    payload.insert(TOKEN_KEY.to_string(), Value::from(token));
    payload
}

// =============================================================================
// GENERICS
// =============================================================================

/// Filters for prototype structures.
#[derive(Debug, Clone, Default)]
pub struct GenericsQuery {
    pub prototype_strukturbericht: Option<String>,
    pub prototype_name: Option<String>,
    pub options: QueryOptions,
}

impl QueryParams for GenericsQuery {
    const ENDPOINT: &'static str = GENERIC_URL;

    fn filters(&self) -> Vec<(&'static str, Value)> {
        vec![
            (
                "prototype_strukturbericht",
                text(self.prototype_strukturbericht.as_deref()),
            ),
            ("prototype_name", text(self.prototype_name.as_deref())),
        ]
    }

    fn options(&self) -> QueryOptions {
        self.options
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// Filters for properties.
#[derive(Debug, Clone)]
pub struct PropertiesQuery {
    pub property_type_name: Option<String>,
    pub property_name: Option<String>,
    /// Composition filter, sent verbatim (see `composition::compile`).
    pub structure_composition: Option<String>,
    pub prototype_strukturbericht: Option<String>,
    pub prototype_name: Option<String>,
    pub property_id: Option<EntityId>,
    pub calculator_name: Option<String>,
    pub visible_for_comparison_only: Option<bool>,
    pub options: QueryOptions,
}

impl Default for PropertiesQuery {
    fn default() -> Self {
        Self {
            property_type_name: None,
            property_name: None,
            structure_composition: None,
            prototype_strukturbericht: None,
            prototype_name: None,
            property_id: None,
            calculator_name: None,
            visible_for_comparison_only: Some(true),
            options: QueryOptions::default(),
        }
    }
}

impl QueryParams for PropertiesQuery {
    const ENDPOINT: &'static str = PROPERTIES_URL;

    fn filters(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("type", text(self.property_type_name.as_deref())),
            ("property_name", text(self.property_name.as_deref())),
            ("composition", text(self.structure_composition.as_deref())),
            (
                "prototype_strukturbericht",
                text(self.prototype_strukturbericht.as_deref()),
            ),
            ("prototype_name", text(self.prototype_name.as_deref())),
            (
                "property_id",
                self.property_id
                    .as_ref()
                    .map_or_else(|| Value::from(""), EntityId::to_json),
            ),
            ("calculator_name", text(self.calculator_name.as_deref())),
            (
                "visible_for_comparison_only",
                self.visible_for_comparison_only
                    .map_or_else(|| Value::from(""), Value::from),
            ),
        ]
    }

    fn options(&self) -> QueryOptions {
        self.options
    }
}

// =============================================================================
// TAXONOMIES
// =============================================================================

/// Filters for property types.
#[derive(Debug, Clone, Default)]
pub struct PropertyTypesQuery {
    pub propertytype_name: Option<String>,
    pub options: QueryOptions,
}

impl QueryParams for PropertyTypesQuery {
    const ENDPOINT: &'static str = PROPERTYTYPE_URL;

    fn filters(&self) -> Vec<(&'static str, Value)> {
        vec![("propertytype_name", text(self.propertytype_name.as_deref()))]
    }

    fn options(&self) -> QueryOptions {
        self.options
    }
}

/// Filters for calculator types.
#[derive(Debug, Clone, Default)]
pub struct CalculatorTypesQuery {
    pub calculator_type_name: Option<String>,
    pub options: QueryOptions,
}

impl QueryParams for CalculatorTypesQuery {
    const ENDPOINT: &'static str = CALCULATORTYPE_URL;

    fn filters(&self) -> Vec<(&'static str, Value)> {
        vec![(
            "calculator_type_name",
            text(self.calculator_type_name.as_deref()),
        )]
    }

    fn options(&self) -> QueryOptions {
        self.options
    }
}

/// Filters for comparison types.
#[derive(Debug, Clone, Default)]
pub struct ComparatorsQuery {
    pub property_type_name: Option<String>,
    pub comparator_name: Option<String>,
    pub options: QueryOptions,
}

impl QueryParams for ComparatorsQuery {
    const ENDPOINT: &'static str = COMPARATOR_URL;

    fn filters(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("type", text(self.property_type_name.as_deref())),
            ("name", text(self.comparator_name.as_deref())),
        ]
    }

    fn options(&self) -> QueryOptions {
        self.options
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_filters_are_empty_strings() {
        let payload = build_payload(&GenericsQuery::default(), json!({}), "t0k");
        assert_eq!(
            Value::Object(payload),
            json!({
                "param_prototype_strukturbericht": "",
                "param_prototype_name": "",
                "param_limit": 100,
                "param_offset": 0,
                "cache_state": {},
                "token": "t0k"
            })
        );
    }

    #[test]
    fn properties_payload_maps_every_filter() {
        let query = PropertiesQuery {
            property_type_name: Some("elastic".into()),
            property_id: Some(EntityId::Int(42)),
            options: QueryOptions {
                limit: 5,
                offset: 10,
                verbose: false,
            },
            ..PropertiesQuery::default()
        };
        let payload = build_payload(&query, json!({"Property": [1]}), "t");

        assert_eq!(payload.get("param_type"), Some(&json!("elastic")));
        assert_eq!(payload.get("param_property_id"), Some(&json!(42)));
        assert_eq!(payload.get("param_composition"), Some(&json!("")));
        assert_eq!(payload.get("param_visible_for_comparison_only"), Some(&json!(true)));
        assert_eq!(payload.get("param_limit"), Some(&json!(5)));
        assert_eq!(payload.get("param_offset"), Some(&json!(10)));
        assert_eq!(payload.get("cache_state"), Some(&json!({"Property": [1]})));
        assert_eq!(payload.len(), 12);
    }

    #[test]
    fn visibility_can_be_left_open() {
        let query = PropertiesQuery {
            visible_for_comparison_only: None,
            ..PropertiesQuery::default()
        };
        let payload = build_payload(&query, json!({}), "t");
        assert_eq!(payload.get("param_visible_for_comparison_only"), Some(&json!("")));
    }

    #[test]
    fn comparator_keys() {
        let query = ComparatorsQuery {
            comparator_name: Some("rmse".into()),
            ..ComparatorsQuery::default()
        };
        let payload = build_payload(&query, json!({}), "t");
        assert_eq!(payload.get("param_type"), Some(&json!("")));
        assert_eq!(payload.get("param_name"), Some(&json!("rmse")));
        assert_eq!(ComparatorsQuery::ENDPOINT, "/api/v1.0/comparisontypes");
    }
}
