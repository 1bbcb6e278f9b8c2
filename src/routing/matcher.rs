//! Route pattern matching.
//!
//! # Responsibilities
//! - Classify a configured route pattern into one matching strategy
//! - Match an incoming path and extract named path variables
//!
//! # Strategies (checked in this order)
//! - Exact: pattern equals the path
//! - Percent wildcard: `/reporting/%IP%/%EPOCH%/ping.txt`
//! - Placeholder: `/test/{param}`
//! - Regex: `r/` prefix, anchored at the start of the path
//!
//! # Design Decisions
//! - Wildcards capture one `/`-delimited segment verbatim
//! - Segment counts must agree exactly
//! - Duplicate variable names within one pattern: last capture wins
//! - Regex failures (rejected pattern, timeout) are a non-match, never an error
//! - Each regex pattern is validated and compiled once per matcher, then cached;
//!   clones share the cache

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;

use crate::routing::regex_guard::{self, GuardedRegex, MatchError};

/// Compiled regex routes kept per matcher. The route table is operator
/// controlled, so the cache is only cleared when it grows past this.
const REGEX_CACHE_CAPACITY: usize = 1024;

/// Variables captured from the path, keyed by wildcard name.
pub type PathVariables = HashMap<String, String>;

/// Literal prefix that marks a regex route.
pub const REGEX_PREFIX: &str = "r/";

static STRICT_IP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9_]+$").expect("static pattern"));
static STRICT_EPOCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("static pattern"));

/// How wildcard segment values are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Any wildcard name, any segment value.
    #[default]
    Generic,
    /// `%IP%` only accepts `[a-fA-F0-9_]+`, `%EPOCH%` only digits.
    Strict,
}

/// The single strategy a pattern string selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Exact,
    PercentWildcard,
    Placeholder,
    Regex,
}

impl Strategy {
    /// Strategy used for `pattern` when it is not literally equal to the path.
    pub fn classify(pattern: &str) -> Self {
        if pattern.contains('%') {
            Strategy::PercentWildcard
        } else if pattern.contains('{') && pattern.contains('}') {
            Strategy::Placeholder
        } else if pattern.starts_with(REGEX_PREFIX) {
            Strategy::Regex
        } else {
            Strategy::Exact
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Exact => "exact",
            Strategy::PercentWildcard => "percent",
            Strategy::Placeholder => "placeholder",
            Strategy::Regex => "regex",
        }
    }
}

/// Pattern source → compiled regex, or `None` for a refused pattern.
type RegexCache = Mutex<HashMap<String, Option<GuardedRegex>>>;

/// Matches route patterns against request paths.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    mode: MatchMode,
    regexes: Arc<RegexCache>,
}

impl RouteMatcher {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            mode,
            regexes: Arc::default(),
        }
    }

    pub fn strict() -> Self {
        Self::new(MatchMode::Strict)
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Match `path` against `pattern`, returning the captured variables.
    pub fn matches(&self, pattern: &str, path: &str) -> Option<PathVariables> {
        if pattern == path {
            return Some(PathVariables::new());
        }

        match Strategy::classify(pattern) {
            Strategy::PercentWildcard => self.match_segments(pattern, path, percent_name),
            Strategy::Placeholder => self.match_segments(pattern, path, brace_name),
            Strategy::Regex => self.match_regex(&pattern[REGEX_PREFIX.len()..], path),
            Strategy::Exact => None,
        }
    }

    fn match_segments(
        &self,
        pattern: &str,
        path: &str,
        wildcard: fn(&str) -> Option<&str>,
    ) -> Option<PathVariables> {
        let parts: Vec<&str> = pattern.split('/').collect();
        let segments: Vec<&str> = path.split('/').collect();
        if parts.len() != segments.len() {
            return None;
        }

        let mut variables = PathVariables::new();
        for (part, segment) in parts.iter().zip(segments.iter()) {
            match wildcard(part) {
                Some(name) => {
                    if !self.accepts(name, segment) {
                        return None;
                    }
                    variables.insert(name.to_string(), segment.to_string());
                }
                None if part != segment => return None,
                None => {}
            }
        }
        Some(variables)
    }

    /// Number of distinct regex patterns seen (compiled or refused).
    pub fn cached_regexes(&self) -> usize {
        self.regexes.lock().expect("regex cache mutex poisoned").len()
    }

    fn compiled(&self, pattern: &str) -> Option<GuardedRegex> {
        let mut cache = self.regexes.lock().expect("regex cache mutex poisoned");
        if let Some(entry) = cache.get(pattern) {
            return entry.clone();
        }

        let entry = match GuardedRegex::new(pattern) {
            Ok(guarded) => Some(guarded),
            Err(rejection) => {
                regex_guard::report_rejection(pattern, &rejection);
                None
            }
        };
        if cache.len() >= REGEX_CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(pattern.to_string(), entry.clone());
        entry
    }

    fn match_regex(&self, pattern: &str, path: &str) -> Option<PathVariables> {
        let guarded = self.compiled(pattern)?;
        match guarded.captures(path) {
            Ok(variables) => variables,
            Err(MatchError::Timeout { elapsed, limit }) => {
                tracing::error!(
                    pattern = %pattern,
                    path = %path,
                    elapsed = ?elapsed,
                    timeout = ?limit,
                    "Regex match exceeded its deadline"
                );
                None
            }
        }
    }

    fn accepts(&self, name: &str, value: &str) -> bool {
        match (self.mode, name) {
            (MatchMode::Strict, "IP") => STRICT_IP.is_match(value),
            (MatchMode::Strict, "EPOCH") => STRICT_EPOCH.is_match(value),
            _ => true,
        }
    }
}

/// Match with the default (generic) matcher.
pub fn match_route(pattern: &str, path: &str) -> Option<PathVariables> {
    RouteMatcher::default().matches(pattern, path)
}

/// `%NAME%` -> `NAME`
fn percent_name(part: &str) -> Option<&str> {
    part.strip_prefix('%')
        .and_then(|rest| rest.strip_suffix('%'))
        .filter(|name| !name.is_empty())
}

/// `{name}` -> `name`
fn brace_name(part: &str) -> Option<&str> {
    part.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}
