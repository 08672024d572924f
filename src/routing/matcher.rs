//! Route pattern compilation and segment matching.
//!
//! # Responsibilities
//! - Parse a route pattern into literal / parameter segments
//! - Match request path segments against a compiled pattern
//! - Normalize and join paths for grouped registration
//!
//! # Design Decisions
//! - Parameters are `:name` segments and always bind
//! - Literal matching is exact and case-sensitive
//! - Segment counts must be equal (no wildcards, no optional segments)
//! - Empty segments are dropped, so `//a///b/` behaves like `/a/b`
//! - Request paths are split on the raw `/` first and each segment is then
//!   percent-decoded, so `%2F` stays inside its segment

use std::borrow::Cow;
use std::collections::HashMap;

use percent_encoding::percent_decode_str;

/// Path parameters bound by a successful match.
pub type Params = HashMap<String, String>;

/// One `/`-delimited unit of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly.
    Literal(String),
    /// Binds whatever the request has at this position.
    Param(String),
}

impl Segment {
    fn parse(part: &str) -> Self {
        match part.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(part.to_string()),
        }
    }

    /// Returns true if this segment binds a parameter.
    pub fn is_param(&self) -> bool {
        matches!(self, Segment::Param(_))
    }
}

/// Compile a route pattern into its segments.
///
/// An empty pattern (or `/`) compiles to no segments and matches only the root path.
pub fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|part| !part.is_empty())
        .map(Segment::parse)
        .collect()
}

/// Split a request path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Percent-decode one request segment. Invalid UTF-8 is replaced, not rejected.
pub fn decode_segment(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment).decode_utf8_lossy()
}

/// Match request segments against compiled pattern segments.
///
/// Returns the bound parameters on success. A repeated parameter name keeps the last binding.
pub fn match_segments(pattern: &[Segment], request: &[&str]) -> Option<Params> {
    if pattern.len() != request.len() {
        return None;
    }

    let mut params = Params::new();
    for (segment, actual) in pattern.iter().zip(request) {
        match segment {
            Segment::Param(name) => {
                params.insert(name.clone(), (*actual).to_string());
            }
            Segment::Literal(expected) => {
                if expected != actual {
                    return None;
                }
            }
        }
    }
    Some(params)
}

/// Normalize a path: leading `/`, no duplicate slashes, no trailing slash except for root.
pub fn clean_path(path: &str) -> String {
    let segments = split_path(path);
    if segments.is_empty() {
        return "/".to_string();
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    cleaned
}

/// Join a base prefix and a path, normalizing both.
pub fn join_path(base: &str, path: &str) -> String {
    let base = clean_path(base);
    let path = clean_path(path);

    match (base.as_str(), path.as_str()) {
        ("/", _) => path,
        (_, "/") => base,
        _ => base + &path,
    }
}
