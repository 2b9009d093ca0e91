//! # Composition Module
//!
//! Compiles a formula-like pattern into the server's element-count query.
//!
//! ## Grammar
//!
//! ```text
//! pattern  := "%" | token*
//! token    := element "-"? quantity? | "*"
//! element  := [A-Z][a-z]?
//! quantity := [0-9]+ | "%"
//! ```
//!
//! Whitespace between tokens is skipped. Anything else stops tokenization and
//! the rest of the input is ignored.

use regex::Regex;
use std::sync::LazyLock;

/// The bare pattern that matches every composition.
pub const MATCH_ALL: &str = "%";

/// Wire value of the atom-type count when it is unknown.
pub const UNKNOWN_ATOM_TYPES: i64 = -1;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<element>[A-Z][a-z]?)-?(?P<quantity>[0-9]+|%)?|(?P<wildcard>\*))")
        .expect("composition token pattern is valid")
});

/// A compiled composition query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionQuery {
    /// The query string sent as the composition filter.
    pub query: String,
    /// Number of distinct elements, or `None` when a wildcard leaves it open.
    pub atom_types: Option<usize>,
}

impl CompositionQuery {
    /// The atom-type count as the server expects it (`-1` for unknown).
    #[must_use]
    pub fn atom_types_wire(&self) -> i64 {
        self.atom_types
            .and_then(|n| i64::try_from(n).ok())
            .unwrap_or(UNKNOWN_ATOM_TYPES)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Element { symbol: &'a str, quantity: &'a str },
    Wildcard,
}

fn tokenize(pattern: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = pattern.trim_start();
    while !rest.is_empty() {
        let Some(caps) = TOKEN_RE.captures(rest) else {
            tracing::debug!("Composition pattern truncated at '{}'", rest);
            break;
        };
        if caps.name("wildcard").is_some() {
            tokens.push(Token::Wildcard);
        } else if let Some(symbol) = caps.name("element") {
            tokens.push(Token::Element {
                symbol: symbol.as_str(),
                quantity: caps.name("quantity").map_or("1", |q| q.as_str()),
            });
        }
        let consumed = caps.get(0).map_or(rest.len(), |m| m.end());
        rest = rest[consumed..].trim_start();
    }
    tokens
}

/// Compile a composition pattern.
///
/// Element terms are sorted by symbol so the result does not depend on the
/// order they were written in. Without a wildcard the terms are space-joined
/// and counted; with one, they are `%`-joined between `%` anchors and the
/// count is unknown.
pub fn compile(pattern: &str) -> CompositionQuery {
    if pattern == MATCH_ALL {
        return CompositionQuery {
            query: MATCH_ALL.to_string(),
            atom_types: None,
        };
    }

    let tokens = tokenize(pattern);
    if tokens.is_empty() && !pattern.trim().is_empty() {
        tracing::warn!(
            "Composition pattern '{}' has no recognised term, compiling to an empty query",
            pattern
        );
    }
    let wildcard = tokens.contains(&Token::Wildcard);

    let mut terms: Vec<(&str, &str)> = tokens
        .iter()
        .filter_map(|token| match token {
            Token::Element { symbol, quantity } => Some((*symbol, *quantity)),
            Token::Wildcard => None,
        })
        .collect();
    terms.sort_by(|a, b| a.0.cmp(b.0));

    let rendered: Vec<String> = terms
        .iter()
        .map(|(symbol, quantity)| format!("{symbol}-{quantity}"))
        .collect();

    let (query, atom_types) = if wildcard {
        (format!("%{}%", rendered.join("%")), None)
    } else {
        let mut distinct: Vec<&str> = terms.iter().map(|(symbol, _)| *symbol).collect();
        distinct.dedup();
        (rendered.join(" "), Some(distinct.len()))
    };

    CompositionQuery {
        query: collapse_wildcards(query),
        atom_types,
    }
}

fn collapse_wildcards(mut query: String) -> String {
    while query.contains("%%") {
        query = query.replace("%%", "%");
    }
    query
}

// =============================================================================
// TESTS
// =============================================================================
