//! Best-effort request body capture.
//!
//! # Responsibilities
//! - Turn raw body bytes into a structured mapping or a printable string
//! - Keep multipart file uploads loggable (base64, or a size marker)
//!
//! # Design Decisions
//! - Never fails: every decode error degrades to an empty mapping or base64 text
//! - Content type is matched on its lowercased essence, parameters stripped

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, request::Parts, Request};
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};

/// Files above this size are recorded by metadata only.
pub const LARGE_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Encoded files above this size are replaced by a marker.
pub const MAX_ENCODED_FILE_BYTES: usize = 1024 * 1024;

/// Captured request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestBody {
    Structured(Map<String, Value>),
    Raw(String),
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Raw(String::new())
    }
}

impl RequestBody {
    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            RequestBody::Structured(map) => Some(map),
            RequestBody::Raw(_) => None,
        }
    }

    /// Raw text, or `""` for structured bodies.
    pub fn raw_text(&self) -> &str {
        match self {
            RequestBody::Structured(_) => "",
            RequestBody::Raw(text) => text,
        }
    }
}

/// Lowercased media type without parameters.
pub fn content_type_essence(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

/// Parse `bytes` according to the request's content type.
pub async fn parse_body(parts: &Parts, bytes: Bytes) -> RequestBody {
    match content_type_essence(parts).as_deref() {
        Some("application/json") => parse_json(&bytes),
        Some("application/x-www-form-urlencoded") => parse_form(&bytes),
        Some("multipart/form-data") => parse_multipart(parts, bytes).await,
        _ => text_or_base64(&bytes),
    }
}

fn parse_json(bytes: &[u8]) -> RequestBody {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => RequestBody::Structured(map),
        Ok(_) => text_or_base64(bytes),
        Err(e) => {
            tracing::debug!(error = %e, "Request body is not valid JSON");
            RequestBody::Structured(Map::new())
        }
    }
}

/// First value per key.
fn parse_form(bytes: &[u8]) -> RequestBody {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        map.entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    RequestBody::Structured(map)
}

async fn parse_multipart(parts: &Parts, bytes: Bytes) -> RequestBody {
    let request = Request::from_parts(parts.clone(), Body::from(bytes));
    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed multipart request");
            return RequestBody::Structured(Map::new());
        }
    };

    let mut map = Map::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed multipart request");
                return RequestBody::Structured(Map::new());
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let media_type = field.content_type().unwrap_or_default().to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(field = %name, error = %e, "Failed to read multipart field");
                return RequestBody::Structured(Map::new());
            }
        };

        let value = match file_name {
            Some(file_name) => file_value(&data, &file_name, &media_type),
            None => String::from_utf8_lossy(&data).into_owned(),
        };
        map.insert(name, Value::String(value));
    }
    RequestBody::Structured(map)
}

fn file_value(data: &[u8], file_name: &str, media_type: &str) -> String {
    if data.len() > LARGE_FILE_BYTES {
        return format!(
            "<large_file size={} name={file_name} type={media_type}>",
            data.len()
        );
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    if encoded.len() > MAX_ENCODED_FILE_BYTES {
        format!("<file_too_large_for_gelf size={}>", encoded.len())
    } else {
        encoded
    }
}

fn text_or_base64(bytes: &[u8]) -> RequestBody {
    match std::str::from_utf8(bytes) {
        Ok(text) => RequestBody::Raw(text.to_string()),
        Err(_) => RequestBody::Raw(base64::engine::general_purpose::STANDARD.encode(bytes)),
    }
}
