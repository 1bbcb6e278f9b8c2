//! Response resolution.
//!
//! # Responsibilities
//! - Find the first route whose pattern matches and which answers the method
//! - Render the winning ResponseSpec into status, media type and body bytes
//!
//! # Design Decisions
//! - A route that matches the path but lacks the method does not stop the
//!   scan; later routes are still tried
//! - No match is not an error; the caller answers 204
//! - Base64 bodies that fail to decode are a configuration error (500)

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;

use crate::config::responses::{ResponseSpec, RouteTable};
use crate::routing::matcher::{PathVariables, RouteMatcher};
use crate::template::{self, Bindings, TemplateError};

/// The winning route for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    pub pattern: &'a str,
    pub spec: &'a ResponseSpec,
    pub variables: PathVariables,
}

/// First route (in table order) matching `path` that configures `method`.
pub fn resolve<'a>(
    table: &'a RouteTable,
    matcher: &RouteMatcher,
    method: &str,
    path: &str,
) -> Option<Resolution<'a>> {
    for route in &table.routes {
        let Some(variables) = matcher.matches(&route.pattern, path) else {
            continue;
        };
        match route.response_for(method) {
            Some(spec) => {
                return Some(Resolution {
                    pattern: &route.pattern,
                    spec,
                    variables,
                })
            }
            None => {
                tracing::debug!(
                    route = %route.pattern,
                    method = %method,
                    path = %path,
                    "Route matched without this method, continuing"
                );
            }
        }
    }
    None
}

/// Rendering or decoding failure for a matched route.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("rendered body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid response status {0}")]
    Status(u16),
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// A rendered canned response.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResponse {
    pub status: StatusCode,
    pub media_type: String,
    pub body: Vec<u8>,
}

impl RenderedResponse {
    /// Render `spec` with `bindings`.
    pub fn render(spec: &ResponseSpec, bindings: &Bindings) -> Result<Self, ResponseError> {
        let status =
            StatusCode::from_u16(spec.status).map_err(|_| ResponseError::Status(spec.status))?;
        let text = template::render(&spec.body, bindings)?;
        let body = if spec.is_base64 {
            decode_base64(&text)?
        } else {
            text.into_bytes()
        };

        Ok(Self {
            status,
            media_type: spec.media_type.clone(),
            body,
        })
    }
}

impl IntoResponse for RenderedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        if let Ok(value) = HeaderValue::from_str(&content_type(&self.media_type)) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

/// Text media types get an explicit UTF-8 charset.
fn content_type(media_type: &str) -> String {
    let lower = media_type.to_ascii_lowercase();
    if lower.starts_with("text/") && !lower.contains("charset") {
        format!("{media_type}; charset=utf-8")
    } else {
        media_type.to_string()
    }
}

/// Standard base64, ignoring characters outside the alphabet (line breaks etc.).
fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();
    base64::engine::general_purpose::STANDARD.decode(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::responses::parse_route_table;
    use crate::template::RenderContext;
    use serde_json::Map;

    const TABLE: &str = r#"
"/test/{param}":
  POST:
    mediatype: application/json
    responsestatus: 201
    body: '{"param":"{{ matched.param }}"}'
"/test/{other}":
  GET:
    mediatype: text/plain
    responsestatus: 200
    body: "second {{ path.other }}"
"r/\\/regex\\/(?P<value>.*?)\\/test":
  GET:
    mediatype: text/plain
    responsestatus: 200
    body: "{{ matched.value }}"
"/blob":
  GET:
    mediatype: application/octet-stream
    responsestatus: 200
    base64: true
    body: "aGVs\nbG8="
"/broken":
  GET:
    mediatype: application/octet-stream
    responsestatus: 200
    base64: true
    body: "a"
"/unsafe":
  GET:
    mediatype: text/plain
    responsestatus: 200
    body: "{{ request.__class__ }}"
"#;

    fn context(method: &str, path: &str) -> RenderContext {
        RenderContext {
            id: "req-1".into(),
            protocol: "http".into(),
            host: "localhost".into(),
            port: "3000".into(),
            method: method.into(),
            path: path.into(),
            headers: Map::new(),
            query_params: Map::new(),
            body: String::new(),
            safe_ip: "127_0_0_1".into(),
            epoch: 0,
        }
    }

    fn respond(method: &str, path: &str) -> Option<Result<RenderedResponse, ResponseError>> {
        let table = parse_route_table(TABLE).unwrap();
        let resolution = resolve(&table, &RouteMatcher::default(), method, path)?;
        let bindings = Bindings::new(&context(method, path), &resolution.variables, None, &Map::new());
        Some(RenderedResponse::render(resolution.spec, &bindings))
    }

    #[test]
    fn test_placeholder_post_renders() {
        let response = respond("POST", "/test/abc").unwrap().unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.media_type, "application/json");
        assert_eq!(response.body, br#"{"param":"abc"}"#);
    }

    #[test]
    fn test_method_miss_continues_scanning() {
        let table = parse_route_table(TABLE).unwrap();
        let resolution = resolve(&table, &RouteMatcher::default(), "GET", "/test/abc").unwrap();
        assert_eq!(resolution.pattern, "/test/{other}");

        let response = respond("GET", "/test/abc").unwrap().unwrap();
        assert_eq!(response.body, b"second abc");
    }

    #[test]
    fn test_no_match() {
        assert!(respond("DELETE", "/test/abc").is_none());
        assert!(respond("GET", "/nothing/here").is_none());
    }

    #[test]
    fn test_regex_route() {
        let response = respond("GET", "/regex/xyz/test").unwrap().unwrap();
        assert_eq!(response.body, b"xyz");
    }

    #[test]
    fn test_base64_body() {
        let response = respond("GET", "/blob").unwrap().unwrap();
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn test_bad_base64_is_error() {
        let result = respond("GET", "/broken").unwrap();
        assert!(matches!(result, Err(ResponseError::Base64(_))));
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_sandbox_violation_propagates() {
        match respond("GET", "/unsafe").unwrap() {
            Err(ResponseError::Template(e)) => assert!(e.is_security()),
            other => panic!("expected security error, got {other:?}"),
        }
    }

    #[test]
    fn test_content_type_charset() {
        assert_eq!(content_type("text/plain"), "text/plain; charset=utf-8");
        assert_eq!(content_type("text/html; charset=latin-1"), "text/html; charset=latin-1");
        assert_eq!(content_type("application/json"), "application/json");
    }
}
