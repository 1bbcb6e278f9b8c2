//! Per-request template bindings.
//!
//! # Responsibilities
//! - Hold the immutable request facts exposed to templates (`RenderContext`)
//! - Assemble the full binding scope for one render
//! - Precompute the `requestdata` query string
//!
//! # Design Decisions
//! - Built once per request right before resolution, never mutated
//! - `request` and `context` name the same object

use serde::Serialize;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::routing::matcher::PathVariables;
use crate::template::eval::{display, Scope};

/// Request facts visible to templates as `request.*`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderContext {
    pub id: String,
    pub protocol: String,
    pub host: String,
    pub port: String,
    pub method: String,
    pub path: String,
    /// Lowercase header names; repeated headers joined with ", ".
    pub headers: Map<String, Value>,
    pub query_params: Map<String, Value>,
    /// Raw text body; empty when the body was parsed into a structure.
    pub body: String,
    pub safe_ip: String,
    pub epoch: i64,
}

/// Everything a single render can see.
#[derive(Debug, Clone)]
pub struct Bindings {
    request: Value,
    variables: Value,
    body: Value,
    query: Value,
    requestdata: String,
}

impl Bindings {
    pub fn new(
        context: &RenderContext,
        variables: &PathVariables,
        body: Option<&Map<String, Value>>,
        query: &Map<String, Value>,
    ) -> Self {
        let variables: Map<String, Value> = variables
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let body = body.cloned().unwrap_or_default();

        Self {
            request: serde_json::to_value(context).unwrap_or(Value::Null),
            variables: Value::Object(variables),
            requestdata: request_data(query, &body),
            body: Value::Object(body),
            query: Value::Object(query.clone()),
        }
    }

    pub fn requestdata(&self) -> &str {
        &self.requestdata
    }

    /// Top-level names for evaluation.
    pub fn scope(&self) -> Scope {
        let mut scope = Scope::new();
        scope.insert("request".into(), self.request.clone());
        scope.insert("context".into(), self.request.clone());
        scope.insert("matched".into(), self.variables.clone());
        scope.insert("path".into(), self.variables.clone());
        scope.insert("body".into(), self.body.clone());
        scope.insert("query".into(), self.query.clone());
        scope.insert("requestdata".into(), Value::String(self.requestdata.clone()));
        scope
    }
}

/// `"?" + urlencode(query ∪ body)`, body keys winning; `""` when both are empty.
pub fn request_data(query: &Map<String, Value>, body: &Map<String, Value>) -> String {
    let mut combined = query.clone();
    for (key, value) in body {
        combined.insert(key.clone(), value.clone());
    }
    if combined.is_empty() {
        return String::new();
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &combined {
        match value {
            Value::Array(items) => {
                for item in items {
                    serializer.append_pair(key, &display(item));
                }
            }
            other => {
                serializer.append_pair(key, &display(other));
            }
        }
    }
    format!("?{}", serializer.finish())
}

/// Client address with separators replaced: `192.168.1.100` → `192_168_1_100`.
pub fn safe_ip(ip: &str) -> String {
    if ip.is_empty() {
        return "unknown".into();
    }
    ip.replace(['.', ':'], "_")
}
