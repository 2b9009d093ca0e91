//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Commands;
use serde_json::json;
use structdb_core::{
    AnyEntity, CalculatorTypesQuery, ComparatorsQuery, CompositionQuery, EntityId, GenericsQuery,
    PropertiesQuery, PropertyTypesQuery, QueryClient, StructDbError, Transport, compile,
};

// =============================================================================
// QUERY COMMANDS
// =============================================================================

/// Run the query named by `command` and return its entries.
///
/// `compile` needs no server and yields no entries.
pub fn run_query<T: Transport>(
    client: &mut QueryClient<T>,
    command: &Commands,
    verbose: bool,
) -> Result<Vec<AnyEntity>, StructDbError> {
    match command {
        Commands::Generics {
            strukturbericht,
            prototype_name,
            page,
        } => client.query_generics(&GenericsQuery {
            prototype_strukturbericht: strukturbericht.clone(),
            prototype_name: prototype_name.clone(),
            options: page.options(verbose),
        }),
        Commands::Properties {
            type_name,
            name,
            composition,
            strukturbericht,
            prototype_name,
            id,
            calculator,
            all,
            page,
        } => client.query_properties(&PropertiesQuery {
            property_type_name: type_name.clone(),
            property_name: name.clone(),
            structure_composition: composition.clone(),
            prototype_strukturbericht: strukturbericht.clone(),
            prototype_name: prototype_name.clone(),
            property_id: id.as_deref().map(parse_id),
            calculator_name: calculator.clone(),
            visible_for_comparison_only: (!*all).then_some(true),
            options: page.options(verbose),
        }),
        Commands::PropertyTypes { name, page } => {
            client.query_property_types(&PropertyTypesQuery {
                propertytype_name: name.clone(),
                options: page.options(verbose),
            })
        }
        Commands::Calculators { name, page } => {
            client.query_calculator_types(&CalculatorTypesQuery {
                calculator_type_name: name.clone(),
                options: page.options(verbose),
            })
        }
        Commands::Comparators {
            type_name,
            name,
            page,
        } => client.query_comparators(&ComparatorsQuery {
            property_type_name: type_name.clone(),
            comparator_name: name.clone(),
            options: page.options(verbose),
        }),
        Commands::Compile { .. } => Ok(Vec::new()),
    }
}

/// Integer ids are sent as numbers, anything else as text.
pub fn parse_id(raw: &str) -> EntityId {
    raw.parse::<i64>()
        .map_or_else(|_| EntityId::from(raw), EntityId::Int)
}

/// One label per line, or a JSON array of `{kind, id, label}`.
pub fn render_entries(entries: &[AnyEntity], json_mode: bool) -> String {
    if json_mode {
        let output: Vec<_> = entries
            .iter()
            .map(|entry| {
                json!({
                    "kind": entry.kind().as_str(),
                    "id": entry.id().to_json(),
                    "label": entry.to_string(),
                })
            })
            .collect();
        return serde_json::to_string_pretty(&output).unwrap_or_default();
    }

    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// COMPILE COMMAND
// =============================================================================

/// Compile a composition pattern and print the result.
pub fn cmd_compile(pattern: &str, json_mode: bool) -> Result<(), StructDbError> {
    println!("{}", render_compiled(&compile(pattern), json_mode));
    Ok(())
}

/// Query string and atom-type count; `-1` when the count is open.
pub fn render_compiled(compiled: &CompositionQuery, json_mode: bool) -> String {
    if json_mode {
        let output = json!({
            "query": compiled.query,
            "atom_types": compiled.atom_types_wire(),
        });
        return serde_json::to_string_pretty(&output).unwrap_or_default();
    }
    format!(
        "Query:      {}\nAtom types: {}",
        compiled.query,
        compiled.atom_types_wire()
    )
}
