//! Route table loading.
//!
//! # Responsibilities
//! - Parse the YAML route table (pattern → method → ResponseSpec)
//! - Keep configuration order, which decides first-match-wins
//! - Skip malformed entries without discarding the rest of the table
//!
//! # File Format
//! ```text
//! "/test/{param}":
//!   POST:
//!     mediatype: application/json
//!     responsestatus: 201
//!     body: '{"param":"{{ matched.param }}"}'
//!     base64: false        # optional
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

/// One configured response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResponseSpec {
    /// Template source.
    pub body: String,

    #[serde(rename = "mediatype")]
    pub media_type: String,

    #[serde(rename = "responsestatus")]
    pub status: u16,

    /// Decode the rendered body from base64 before sending.
    #[serde(rename = "base64", default)]
    pub is_base64: bool,
}

/// One route pattern and its method table, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: String,
    pub methods: Vec<(String, ResponseSpec)>,
}

impl Route {
    /// Exact, case-sensitive method lookup.
    pub fn response_for(&self, method: &str) -> Option<&ResponseSpec> {
        self.methods
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, spec)| spec)
    }
}

/// Ordered route table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    pub routes: Vec<Route>,
    /// Entries skipped while loading, as human-readable notes.
    pub skipped: Vec<String>,
}

impl RouteTable {
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Route table loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ResponsesError {
    #[error("cannot read route table: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse route table: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("route table must be a mapping at the top level")]
    NotMapping,
}

/// Load the table at `path`.
pub fn load_route_table(path: &Path) -> Result<RouteTable, ResponsesError> {
    let content = fs::read_to_string(path)?;
    parse_route_table(&content)
}

/// Per-request loading: a missing or unusable file means "no configuration".
pub fn load_responses(path: &Path) -> Option<RouteTable> {
    if !path.exists() {
        return None;
    }
    match load_route_table(path) {
        Ok(table) => Some(table),
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "Error loading route table");
            None
        }
    }
}

/// Parse route table YAML.
pub fn parse_route_table(content: &str) -> Result<RouteTable, ResponsesError> {
    let document: YamlValue = serde_yaml::from_str(content)?;
    let mapping = match document {
        YamlValue::Mapping(mapping) => mapping,
        _ => return Err(ResponsesError::NotMapping),
    };

    let mut table = RouteTable::default();
    for (key, value) in mapping {
        let Some(pattern) = key.as_str().map(str::to_string) else {
            table.skip(format!("route key {key:?} is not a string"));
            continue;
        };
        let YamlValue::Mapping(methods) = value else {
            table.skip(format!("route {pattern:?}: method table is not a mapping"));
            continue;
        };

        let mut route = Route {
            pattern,
            methods: Vec::with_capacity(methods.len()),
        };
        for (method, spec) in methods {
            let Some(method) = method.as_str().map(str::to_string) else {
                table.skip(format!("route {:?}: method {method:?} is not a string", route.pattern));
                continue;
            };
            match serde_yaml::from_value::<ResponseSpec>(spec) {
                Ok(spec) if (100..=599).contains(&spec.status) => route.methods.push((method, spec)),
                Ok(spec) => {
                    tracing::error!(
                        route = %route.pattern,
                        method = %method,
                        status = spec.status,
                        "Invalid response status, entry skipped"
                    );
                    table.skipped.push(format!(
                        "route {:?} {method}: invalid status {}",
                        route.pattern, spec.status
                    ));
                }
                Err(e) => {
                    table.skip(format!("route {:?} {method}: {e}", route.pattern));
                }
            }
        }
        table.routes.push(route);
    }
    Ok(table)
}

impl RouteTable {
    fn skip(&mut self, note: String) {
        tracing::warn!(entry = %note, "Skipping malformed route table entry");
        self.skipped.push(note);
    }
}
