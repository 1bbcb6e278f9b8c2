//! Request size limits.
//!
//! # Responsibilities
//! - Enforce maximum URL length (path plus query string)
//! - Enforce maximum request body size
//!
//! # Design Decisions
//! - Violations are answered with a status, never dropped silently;
//!   the request is still recorded
//! - Content-Length is checked before the body is read

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, StatusCode, Uri};

use crate::config::ServerConfig;

/// Path characters kept when logging an oversized URL.
const LOGGED_PATH_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimitViolation {
    #[error("URL length {length} exceeds limit {limit}")]
    UriTooLong { length: usize, limit: usize },
    #[error("body of {length} bytes exceeds limit {limit}")]
    PayloadTooLarge { length: usize, limit: usize },
}

impl LimitViolation {
    pub fn status(&self) -> StatusCode {
        match self {
            LimitViolation::UriTooLong { .. } => StatusCode::URI_TOO_LONG,
            LimitViolation::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_url_length: usize,
    pub max_content_length: usize,
}

impl RequestLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_url_length: config.max_url_length,
            max_content_length: config.max_content_length,
        }
    }

    /// Check `len(path + "?" + query)` against the limit.
    pub fn check_url(&self, uri: &Uri) -> Result<(), LimitViolation> {
        let length = url_length(uri);
        if length > self.max_url_length {
            tracing::warn!(
                length,
                limit = self.max_url_length,
                path = %truncated(uri.path()),
                "URL length exceeds limit"
            );
            return Err(LimitViolation::UriTooLong {
                length,
                limit: self.max_url_length,
            });
        }
        Ok(())
    }

    /// Reject a declared Content-Length over the limit.
    pub fn check_declared_length(&self, headers: &HeaderMap) -> Result<(), LimitViolation> {
        match declared_length(headers) {
            Some(length) if length > self.max_content_length as u64 => {
                Err(LimitViolation::PayloadTooLarge {
                    length: length as usize,
                    limit: self.max_content_length,
                })
            }
            _ => Ok(()),
        }
    }

    /// Read the whole body, failing once it grows past the limit.
    pub async fn read_body(&self, body: Body) -> Result<Bytes, LimitViolation> {
        axum::body::to_bytes(body, self.max_content_length)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Failed to read request body");
                LimitViolation::PayloadTooLarge {
                    length: self.max_content_length.saturating_add(1),
                    limit: self.max_content_length,
                }
            })
    }
}

pub fn url_length(uri: &Uri) -> usize {
    uri.path().len() + 1 + uri.query().map_or(0, str::len)
}

/// Content-Length header, if present and numeric.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn truncated(path: &str) -> String {
    if path.chars().count() > LOGGED_PATH_CHARS {
        let head: String = path.chars().take(LOGGED_PATH_CHARS).collect();
        format!("{head}...")
    } else {
        path.to_string()
    }
}
