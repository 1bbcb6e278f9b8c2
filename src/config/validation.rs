//! Configuration validation and route-table lint.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, capacities > 0, addresses parse)
//! - Normalise soft settings (log format) with a warning
//! - Lint route tables for authoring mistakes that still load
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Lint findings never block startup; they are logged
//! - Validation is pure function: DeadendConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::responses::{Route, RouteTable};
use crate::config::schema::DeadendConfig;
use crate::routing::matcher::{RouteMatcher, Strategy, REGEX_PREFIX};
use crate::routing::regex_guard;

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Supported stats output formats.
pub const LOG_FORMATS: [&str; 2] = ["json", "text"];

/// Fix up soft settings in place.
pub fn normalize_config(config: &mut DeadendConfig) {
    let format = config.stats.log_format.to_lowercase();
    if LOG_FORMATS.contains(&format.as_str()) {
        config.stats.log_format = format;
    } else {
        tracing::warn!(
            log_format = %config.stats.log_format,
            "Invalid LOG_FORMAT, falling back to json"
        );
        config.stats.log_format = "json".to_string();
    }
}

/// Validate a config, collecting every problem.
pub fn validate_config(config: &DeadendConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.max_url_length == 0 {
        errors.push(ValidationError::new("server.max_url_length", "must be greater than 0"));
    }
    if config.server.max_content_length == 0 {
        errors.push(ValidationError::new("server.max_content_length", "must be greater than 0"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if config.responses.file.trim().is_empty() {
        errors.push(ValidationError::new("responses.file", "must not be empty"));
    }
    if config.stats.interval_secs == 0 {
        errors.push(ValidationError::new("stats.interval_secs", "must be greater than 0"));
    }
    if config.stats.heartbeat_interval_secs == 0 {
        errors.push(ValidationError::new(
            "stats.heartbeat_interval_secs",
            "must be greater than 0",
        ));
    }
    for (field, value) in [
        ("stats.path_capacity", config.stats.path_capacity),
        ("stats.ip_capacity", config.stats.ip_capacity),
        ("stats.recent_capacity", config.stats.recent_capacity),
        ("gelf.queue_size", config.gelf.queue_size),
        ("gelf.max_payload_bytes", config.gelf.max_payload_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "observability.metrics_address",
                format!("invalid socket address: {addr}"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A route-table authoring problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintFinding {
    pub route: String,
    pub message: String,
}

impl fmt::Display for LintFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.route, self.message)
    }
}

/// Inspect a loaded table for entries that load but will not behave as written.
pub fn lint_routes(table: &RouteTable) -> Vec<LintFinding> {
    let mut findings: Vec<LintFinding> = table
        .skipped
        .iter()
        .map(|note| LintFinding {
            route: "(skipped)".into(),
            message: note.clone(),
        })
        .collect();
    for (index, route) in table.routes.iter().enumerate() {
        let mut finding = |message: String| {
            findings.push(LintFinding {
                route: route.pattern.clone(),
                message,
            })
        };

        if route.methods.is_empty() {
            finding("no methods configured; the route never answers".into());
        }
        for (method, _) in &route.methods {
            if *method != method.to_uppercase() {
                finding(format!(
                    "method {method:?} is not upper case and will never match"
                ));
            }
        }
        let strategy = Strategy::classify(&route.pattern);
        if strategy == Strategy::Exact {
            if let Some(earlier) = shadowing_route(&table.routes[..index], route) {
                finding(format!("unreachable: every method is answered first by {earlier:?}"));
            }
        }

        if route.pattern.starts_with(REGEX_PREFIX) && strategy != Strategy::Regex {
            finding(format!(
                "looks like a regex route but is matched by the {} strategy",
                strategy.as_str()
            ));
        }
        if strategy == Strategy::Regex {
            if let Err(rejection) = regex_guard::check_pattern(&route.pattern[REGEX_PREFIX.len()..]) {
                finding(format!("regex rejected: {rejection}"));
            }
        }
    }
    findings
}

/// An earlier route that matches `route`'s literal path and answers every
/// method it configures.
fn shadowing_route<'a>(earlier: &'a [Route], route: &Route) -> Option<&'a str> {
    let matcher = RouteMatcher::default();
    earlier
        .iter()
        .find(|candidate| {
            !route.methods.is_empty()
                && matcher.matches(&candidate.pattern, &route.pattern).is_some()
                && route
                    .methods
                    .iter()
                    .all(|(method, _)| candidate.response_for(method).is_some())
        })
        .map(|candidate| candidate.pattern.as_str())
}

/// Log every lint finding at warn.
pub fn log_lint(table: &RouteTable) {
    for finding in lint_routes(table) {
        tracing::warn!(route = %finding.route, issue = %finding.message, "Route table lint");
    }
}
