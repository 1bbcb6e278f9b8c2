//! Per-request access record.
//!
//! # Responsibilities
//! - Describe one handled request for both log streams
//! - Emit the synchronous debug line (`web_deadend::access`)
//! - Flatten body and query maps into searchable fields for shipping
//!
//! # Design Decisions
//! - One record type feeds both streams so they never disagree
//! - Flattened copies are additive; the nested originals are kept

use serde::Serialize;
use serde_json::{Map, Value};

use crate::http::body::RequestBody;

/// Everything logged about one request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub request_id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub version: String,
    pub hostname: String,
    pub remote_addr: String,
    pub method: String,
    pub path: String,
    pub headers: Map<String, Value>,
    pub query_params: Map<String, Value>,
    pub body: RequestBody,
    pub request_size: u64,
    pub response_status: u16,
    pub response_size: u64,
    pub duration_ms: u64,
}

impl RequestRecord {
    /// `"<METHOD> <path> <status> <duration>ms"`.
    pub fn message(&self) -> String {
        format!(
            "{} {} {} {}ms",
            self.method, self.path, self.response_status, self.duration_ms
        )
    }

    /// Emit the synchronous access line.
    pub fn log(&self) {
        match serde_json::to_string(self) {
            Ok(line) => tracing::debug!(target: "web_deadend::access", "{}", line),
            Err(e) => tracing::warn!(request_id = %self.request_id, error = %e, "Failed to serialise access record"),
        }
    }

    /// Structured fields for shipping, with `body_*` / `query_*` copies.
    pub fn shipping_fields(&self) -> Map<String, Value> {
        let mut fields = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        if let RequestBody::Structured(body) = &self.body {
            fields.insert(
                "body_json".into(),
                Value::String(Value::Object(body.clone()).to_string()),
            );
            for (key, value) in body {
                fields.insert(format!("body_{key}"), value.clone());
            }
        }

        if !self.query_params.is_empty() {
            fields.insert(
                "query_params_json".into(),
                Value::String(Value::Object(self.query_params.clone()).to_string()),
            );
            for (key, value) in &self.query_params {
                fields.insert(format!("query_{key}"), value.clone());
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(body: RequestBody) -> RequestRecord {
        RequestRecord {
            request_id: "0192f0aa-0000-7000-8000-000000000001".into(),
            timestamp: "2024-10-17T00:00:00+00:00".into(),
            version: "dev".into(),
            hostname: "device.local".into(),
            remote_addr: "10.0.0.7".into(),
            method: "POST".into(),
            path: "/login".into(),
            headers: Map::new(),
            query_params: Map::from_iter([("q".to_string(), json!("1"))]),
            body,
            request_size: 12,
            response_status: 204,
            response_size: 0,
            duration_ms: 3,
        }
    }

    #[test]
    fn test_message() {
        assert_eq!(record(RequestBody::default()).message(), "POST /login 204 3ms");
    }

    #[test]
    fn test_structured_body_is_flattened() {
        let body = RequestBody::Structured(Map::from_iter([
            ("user".to_string(), json!("root")),
            ("pin".to_string(), json!(1234)),
        ]));
        let fields = record(body).shipping_fields();

        assert_eq!(fields["body_user"], "root");
        assert_eq!(fields["body_pin"], 1234);
        assert_eq!(fields["body_json"], r#"{"user":"root","pin":1234}"#);
        assert_eq!(fields["body"]["user"], "root");
        assert_eq!(fields["query_q"], "1");
        assert_eq!(fields["query_params_json"], r#"{"q":"1"}"#);
    }

    #[test]
    fn test_raw_body_not_flattened() {
        let mut rec = record(RequestBody::Raw("plain".into()));
        rec.query_params.clear();
        let fields = rec.shipping_fields();

        assert_eq!(fields["body"], "plain");
        assert!(!fields.contains_key("body_json"));
        assert!(!fields.contains_key("query_params_json"));
        assert_eq!(fields["response_status"], 204);
    }
}
