//! Iteration argument matching: the comparator family used to decide
//! whether a log's argument tuple matches a database iteration's argument
//! bindings, plus the wildcard sentinel.

use std::fmt;

/// Sentinel argument value meaning "matches any value" — wildcards exist
/// only in the database, never in logs.
pub const WILDCARD: &str = "";

/// Value comparator selectable from the CLI (`--comparison`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparator {
    Exact,
    Casefold,
    WhitespaceNormalized,
    TokenSet,
}

impl Comparator {
    pub fn parse(s: &str) -> Option<Comparator> {
        match s {
            "exact" => Some(Comparator::Exact),
            "casefold" => Some(Comparator::Casefold),
            "normalised" | "normalized" => Some(Comparator::WhitespaceNormalized),
            "tokens" => Some(Comparator::TokenSet),
            _ => None,
        }
    }

    pub fn equal(&self, a: &str, b: &str) -> bool {
        match self {
            Comparator::Exact => a == b,
            Comparator::Casefold => a.eq_ignore_ascii_case(b),
            Comparator::WhitespaceNormalized => normalize_whitespace(a) == normalize_whitespace(b),
            Comparator::TokenSet => token_set(a) == token_set(b),
        }
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Comparator::Exact
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Exact => "exact",
            Comparator::Casefold => "casefold",
            Comparator::WhitespaceNormalized => "normalised",
            Comparator::TokenSet => "tokens",
        };
        write!(f, "{s}")
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn token_set(s: &str) -> std::collections::BTreeSet<&str> {
    s.split_whitespace().collect()
}

/// Is `value` the wildcard sentinel?
pub fn is_wildcard(value: &str) -> bool {
    value == WILDCARD
}

/// Does argument tuple `a` (from a log, name -> value, no wildcards) match
/// database iteration bindings `db_args` (name -> value, may contain
/// wildcards) under `cmp`? A bijection by name is required: same argument
/// names on both sides, and each pair's values compare equal under `cmp`
/// (a wildcard on the database side matches any value).
pub fn args_match(log_args: &[(String, String)], db_args: &[(String, String)], cmp: Comparator) -> bool {
    if log_args.len() != db_args.len() {
        return false;
    }
    for (name, value) in log_args {
        match db_args.iter().find(|(n, _)| n == name) {
            None => return false,
            Some((_, db_value)) => {
                if !is_wildcard(db_value) && !cmp.equal(value, db_value) {
                    return false;
                }
            }
        }
    }
    true
}

/// True if `db_args` contains at least one wildcard value.
pub fn has_wildcard(db_args: &[(String, String)]) -> bool {
    db_args.iter().any(|(_, v)| is_wildcard(v))
}
