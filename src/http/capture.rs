//! Request capture middleware.
//!
//! # Responsibilities
//! - Enforce URL and body limits (414 / 413)
//! - Buffer and parse the body once, for templates and logs alike
//! - Percent-decode the path once; routing, stats and logs all see the decoded form
//! - After the handler: account the request, emit the access line,
//!   hand the record to the log shipper
//!
//! # Design Decisions
//! - Accounting happens before the shipper enqueue, both before the response
//!   leaves this middleware
//! - Local status probes (`127.0.0.1` on `/deadend-status`) are not recorded
//! - Rejected requests are recorded like any other

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, request::Parts, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::http::body::{self, RequestBody};
use crate::http::request::RequestIdExt;
use crate::http::server::{AppState, STATUS_PATH};
use crate::observability::{metrics, RequestRecord};
use crate::security::limits::{self, LimitViolation, RequestLimits};
use crate::stats::CompletedRequest;

/// Version stamped on request records.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the handler can see of the captured request.
#[derive(Debug, Clone, Default)]
pub struct CapturedRequest {
    pub client_ip: Option<IpAddr>,
    /// Percent-decoded request path.
    pub path: String,
    /// Lowercase names; repeated headers joined with ", ".
    pub headers: Map<String, Value>,
    /// First value per key.
    pub query_params: Map<String, Value>,
    pub body: RequestBody,
}

pub async fn capture(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let client_ip = remote.ip().to_canonical();
    let path = decoded_path(request.uri().path());
    if is_local_probe(&path, client_ip) {
        return next.run(request).await;
    }

    let request_id = request.request_id().to_string();
    let (mut parts, raw_body) = request.into_parts();
    let method = parts.method.to_string();
    let hostname = host(&parts.headers);
    let headers = header_map(&parts.headers);
    let query_params = query_map(parts.uri.query());
    let declared_size = limits::declared_length(&parts.headers);

    let (response, captured_body, body_size) = match admit(&state.limits, &parts, raw_body).await {
        Err(violation) => (violation.status().into_response(), RequestBody::default(), 0),
        Ok(bytes) => {
            let parsed = body::parse_body(&parts, bytes.clone()).await;
            let size = bytes.len();
            parts.extensions.insert(Arc::new(CapturedRequest {
                client_ip: Some(client_ip),
                path: path.clone(),
                headers: headers.clone(),
                query_params: query_params.clone(),
                body: parsed.clone(),
            }));
            let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
            (response, parsed, size)
        }
    };

    let status = response.status().as_u16();
    let request_size = declared_size.unwrap_or(body_size as u64);
    let response_size = response.body().size_hint().exact().unwrap_or(0);
    let remote_addr = client_ip.to_string();

    state.stats.record(&CompletedRequest {
        method: method.clone(),
        path: path.clone(),
        query_params: query_params.clone(),
        host: hostname.clone(),
        client_ip: remote_addr.clone(),
        status,
        bytes_received: request_size,
        bytes_sent: response_size,
    });

    let record = RequestRecord {
        request_id,
        timestamp: Utc::now().to_rfc3339(),
        version: VERSION.to_string(),
        hostname,
        remote_addr,
        method,
        path,
        headers,
        query_params,
        body: captured_body,
        request_size,
        response_status: status,
        response_size,
        duration_ms: millis(start.elapsed()),
    };
    record.log();
    if let Some(shipper) = &state.shipper {
        shipper.submit(&record);
    }
    metrics::record_request(&record.method, status, start);

    response
}

async fn admit(limits: &RequestLimits, parts: &Parts, body: Body) -> Result<Bytes, LimitViolation> {
    limits.check_url(&parts.uri)?;
    limits.check_declared_length(&parts.headers)?;
    limits.read_body(body).await
}

fn is_local_probe(path: &str, client_ip: IpAddr) -> bool {
    path == STATUS_PATH && client_ip == IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Whole milliseconds, saturating.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Percent-decoded path; invalid UTF-8 sequences become U+FFFD.
pub fn decoded_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Host header value, or `""`.
pub fn host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Headers as a JSON map; non-UTF-8 values are decoded lossily.
pub fn header_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    map
}

/// Query string as a JSON map, first value per key.
pub fn query_map(query: Option<&str>) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            map.entry(key.into_owned())
                .or_insert_with(|| Value::String(value.into_owned()));
        }
    }
    map
}
