//! Regex route guard.
//!
//! # Responsibilities
//! - Reject regex route patterns that look like catastrophic-backtracking shapes
//! - Reject oversized and uncompilable patterns
//! - Bound every match attempt by a wall-clock deadline
//!
//! # Design Decisions
//! - Shape checks run before compilation; rejected patterns never match
//! - The engine is linear-time, so the match runs inline on the caller's
//!   (blocking) thread; a match that overruns the deadline counts as no match

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use crate::observability::metrics;

/// Maximum accepted pattern length, in characters.
pub const MAX_PATTERN_LEN: usize = 500;

/// Wall-clock ceiling for a single match attempt.
pub const MATCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Compiled program size ceiling handed to the regex builder.
const COMPILED_SIZE_LIMIT: usize = 1 << 20;

/// Why a pattern was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegexRejection {
    #[error("pattern too long ({0} chars)")]
    TooLong(usize),
    #[error("pattern contains nested quantifiers")]
    NestedQuantifier,
    #[error("invalid pattern: {0}")]
    Invalid(String),
}

impl RegexRejection {
    fn reason(&self) -> &'static str {
        match self {
            RegexRejection::TooLong(_) => "too_long",
            RegexRejection::NestedQuantifier => "nested_quantifier",
            RegexRejection::Invalid(_) => "invalid",
        }
    }
}

/// Failure of a single guarded match attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("regex match took {elapsed:?}, limit {limit:?}")]
    Timeout { elapsed: Duration, limit: Duration },
}

/// `(x+)+`, `(x*){n}` and `{m,n}+` shapes.
static DANGER_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\([^)]*[*+]\)[*+]", r"\([^)]*[*+]\)\{", r"\{[^}]+\}[*+]"]
        .iter()
        .filter_map(|shape| Regex::new(shape).ok())
        .collect()
});

/// Check a pattern without compiling it for matching.
pub fn check_pattern(pattern: &str) -> Result<(), RegexRejection> {
    let length = pattern.chars().count();
    if length > MAX_PATTERN_LEN {
        return Err(RegexRejection::TooLong(length));
    }

    if DANGER_SHAPES.iter().any(|shape| shape.is_match(pattern)) {
        return Err(RegexRejection::NestedQuantifier);
    }

    RegexBuilder::new(pattern)
        .size_limit(COMPILED_SIZE_LIMIT)
        .build()
        .map(|_| ())
        .map_err(|e| RegexRejection::Invalid(e.to_string()))
}

/// Log and count a refused pattern.
pub fn report_rejection(pattern: &str, rejection: &RegexRejection) {
    let preview: String = pattern.chars().take(100).collect();
    tracing::warn!(
        pattern = %preview,
        reason = %rejection,
        "Regex route pattern rejected"
    );
    metrics::record_regex_rejection(rejection.reason());
}

/// A validated regex route, anchored at the start of the path.
#[derive(Debug, Clone)]
pub struct GuardedRegex {
    compiled: Arc<Regex>,
    timeout: Duration,
}

impl GuardedRegex {
    /// Validate and compile `pattern`. Matching is anchored at the start of
    /// the haystack; trailing input is allowed unless the pattern anchors it.
    pub fn new(pattern: &str) -> Result<Self, RegexRejection> {
        // Checked unwrapped first: wrapping can make an unbalanced pattern parse.
        check_pattern(pattern)?;
        let compiled = RegexBuilder::new(&format!(r"\A(?:{})", pattern))
            .size_limit(COMPILED_SIZE_LIMIT)
            .build()
            .map_err(|e| RegexRejection::Invalid(e.to_string()))?;

        Ok(Self {
            compiled: Arc::new(compiled),
            timeout: MATCH_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Match `path`, returning named captures on success.
    ///
    /// Named groups that did not participate in the match capture "".
    pub fn captures(&self, path: &str) -> Result<Option<HashMap<String, String>>, MatchError> {
        let start = Instant::now();
        let result = named_captures(&self.compiled, path);
        let elapsed = start.elapsed();
        if elapsed > self.timeout {
            return Err(MatchError::Timeout {
                elapsed,
                limit: self.timeout,
            });
        }
        Ok(result)
    }
}

fn named_captures(regex: &Regex, haystack: &str) -> Option<HashMap<String, String>> {
    let caps = regex.captures(haystack)?;
    let mut variables = HashMap::new();
    for name in regex.capture_names().flatten() {
        let value = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
        variables.insert(name.to_string(), value.to_string());
    }
    Some(variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_long_patterns() {
        let pattern = "a".repeat(501);
        assert_eq!(check_pattern(&pattern), Err(RegexRejection::TooLong(501)));
        assert!(check_pattern(&"a".repeat(500)).is_ok());
    }

    #[test]
    fn test_rejects_nested_quantifiers() {
        for pattern in ["(a+)+", "(a*)*", "(a+)*b", "(x+){2,5}", "a{1,3}+", "^(a+)+b$"] {
            assert_eq!(
                check_pattern(pattern),
                Err(RegexRejection::NestedQuantifier),
                "{pattern} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_invalid_patterns() {
        assert!(matches!(check_pattern("(unclosed"), Err(RegexRejection::Invalid(_))));
        assert!(matches!(check_pattern("[z-a]"), Err(RegexRejection::Invalid(_))));
    }

    #[test]
    fn test_accepts_ordinary_patterns() {
        assert!(check_pattern(r"\/regex\/(?P<value>.*?)\/test").is_ok());
        assert!(check_pattern(r"/api/v[0-9]+/users").is_ok());
    }

    #[test]
    fn test_captures_named_groups() {
        let regex = GuardedRegex::new(r"\/regex\/(?P<value>.*?)\/test").unwrap();
        let vars = regex.captures("/regex/xyz/test").unwrap().unwrap();
        assert_eq!(vars.get("value").map(String::as_str), Some("xyz"));
    }

    #[test]
    fn test_match_is_anchored_at_start() {
        let regex = GuardedRegex::new(r"/api/(?P<id>\d+)").unwrap();
        assert!(regex.captures("/prefix/api/12").unwrap().is_none());
        // trailing input is fine
        let vars = regex.captures("/api/12/extra").unwrap().unwrap();
        assert_eq!(vars["id"], "12");
    }

    #[test]
    fn test_no_named_groups_yields_empty_set() {
        let regex = GuardedRegex::new(r"/static/.*\.js").unwrap();
        assert_eq!(regex.captures("/static/app.js").unwrap(), Some(HashMap::new()));
    }

    #[test]
    fn test_unmatched_optional_group_is_empty() {
        let regex = GuardedRegex::new(r"/a(?P<opt>/b)?").unwrap();
        let vars = regex.captures("/a").unwrap().unwrap();
        assert_eq!(vars["opt"], "");
    }

    #[test]
    fn test_pathological_input_returns_quickly() {
        // the shape check refuses it; the engine itself is linear anyway
        assert!(GuardedRegex::new("^(a+)+b$").is_err());
        let regex = GuardedRegex::new("^a+b$").unwrap();
        let input = format!("{}!", "a".repeat(25));
        let start = Instant::now();
        assert_eq!(regex.captures(&input).unwrap(), None);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_overrun_is_reported_as_timeout() {
        let regex = GuardedRegex::new("/x").unwrap().with_timeout(Duration::ZERO);
        let haystack = format!("/x{}", "y".repeat(100_000));
        match regex.captures(&haystack) {
            Err(MatchError::Timeout { limit, .. }) => assert_eq!(limit, Duration::ZERO),
            Ok(_) => {} // finished within the clock's resolution
        }
    }
}
