//! Request identification.
//!
//! # Responsibilities
//! - Assign every request a fresh UUIDv7 before anything else runs
//! - Expose it to handlers (extension) and clients (`X-Request-ID`)
//!
//! # Design Decisions
//! - A client-supplied `X-Request-ID` is overwritten, never trusted
//! - UUIDv7 keeps ids time-sortable in the log collector

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Per-request identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read the id assigned to a request.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl<B> RequestIdExt for axum::http::Request<B> {
    fn request_id(&self) -> &str {
        self.extensions()
            .get::<RequestId>()
            .map_or("unknown", RequestId::as_str)
    }
}

/// Middleware: assign the id, then echo it on the response.
pub async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId::generate();
    let value = HeaderValue::from_str(id.as_str()).ok();

    if let Some(value) = &value {
        request.headers_mut().insert(X_REQUEST_ID, value.clone());
    } else {
        request.headers_mut().remove(X_REQUEST_ID);
    }
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}
