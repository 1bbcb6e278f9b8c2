//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum Router: status endpoint plus catch-all for every method and path
//! - Wire up middleware (trace, request id, capture, timeout)
//! - Resolve and render canned responses off the async runtime
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::responses::load_responses;
use crate::config::DeadendConfig;
use crate::http::capture::{self, CapturedRequest};
use crate::http::request::{assign_request_id, RequestIdExt};
use crate::observability::LogShipper;
use crate::routing::{resolve, MatchMode, RenderedResponse, ResponseError, RouteMatcher};
use crate::security::{AccessList, RequestLimits};
use crate::stats::RequestStats;
use crate::template::context::safe_ip;
use crate::template::{Bindings, RenderContext};

/// Status endpoint path.
pub const STATUS_PATH: &str = "/deadend-status";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DeadendConfig>,
    pub matcher: RouteMatcher,
    pub limits: RequestLimits,
    pub access: Arc<AccessList>,
    pub stats: Arc<RequestStats>,
    pub shipper: Option<Arc<LogShipper>>,
}

impl AppState {
    pub fn new(config: DeadendConfig, shipper: Option<Arc<LogShipper>>) -> Self {
        let mode = if config.responses.strict_wildcards {
            MatchMode::Strict
        } else {
            MatchMode::Generic
        };
        Self {
            matcher: RouteMatcher::new(mode),
            limits: RequestLimits::from_config(&config.server),
            access: Arc::new(AccessList::from_config(&config.healthcheck.allowed)),
            stats: Arc::new(RequestStats::new(&config.stats)),
            shipper,
            config: Arc::new(config),
        }
    }
}

/// HTTP server for the honeypot.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = build_router(state.clone());
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until `shutdown` resolves, then finish in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            responses_file = %self.state.config.responses.file,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let body_limit = state.config.server.max_content_length;

    Router::new()
        .route(STATUS_PATH, get(deadend_status).fallback(catch_all))
        .fallback(catch_all)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(assign_request_id))
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(middleware::from_fn_with_state(state.clone(), capture::capture))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}

/// `GET /deadend-status`: fixed body for allowed clients, 204 for everyone else.
async fn deadend_status(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    let ip = remote.ip();
    if state.access.allows(ip) {
        (StatusCode::OK, Json(json!({"service": "ok"}))).into_response()
    } else {
        tracing::warn!(client = %ip, "Healthcheck denied");
        StatusCode::NO_CONTENT.into_response()
    }
}

/// Every other method and path: first matching route, or an empty 204.
async fn catch_all(State(state): State<AppState>, request: Request) -> Response {
    let captured = request
        .extensions()
        .get::<Arc<CapturedRequest>>()
        .cloned()
        .unwrap_or_default();
    let context = render_context(&state, &request, &captured);
    let request_id = context.id.clone();
    let file = PathBuf::from(&state.config.responses.file);
    let matcher = state.matcher.clone();

    let result =
        tokio::task::spawn_blocking(move || respond(&file, &matcher, &context, &captured)).await;

    match result {
        Ok(Ok(Some(rendered))) => rendered.into_response(),
        Ok(Ok(None)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to render response");
            e.into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Response task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Load the route table, resolve, render. `None` means "answer 204".
fn respond(
    file: &Path,
    matcher: &RouteMatcher,
    context: &RenderContext,
    captured: &CapturedRequest,
) -> Result<Option<RenderedResponse>, ResponseError> {
    let Some(table) = load_responses(file) else {
        return Ok(None);
    };
    let Some(resolution) = resolve(&table, matcher, &context.method, &context.path) else {
        return Ok(None);
    };
    tracing::debug!(
        request_id = %context.id,
        route = %resolution.pattern,
        "Route matched"
    );

    let bindings = Bindings::new(
        context,
        &resolution.variables,
        captured.body.as_map(),
        &captured.query_params,
    );
    RenderedResponse::render(resolution.spec, &bindings).map(Some)
}

fn render_context(state: &AppState, request: &Request, captured: &CapturedRequest) -> RenderContext {
    let client_ip = captured
        .client_ip
        .map(|ip| ip.to_string())
        .unwrap_or_default();
    RenderContext {
        id: request.request_id().to_string(),
        protocol: request.uri().scheme_str().unwrap_or("http").to_string(),
        host: capture::host(request.headers()),
        port: state.config.server.port.to_string(),
        method: request.method().to_string(),
        path: if captured.path.is_empty() {
            capture::decoded_path(request.uri().path())
        } else {
            captured.path.clone()
        },
        headers: captured.headers.clone(),
        query_params: captured.query_params.clone(),
        body: captured.body.raw_text().to_string(),
        safe_ip: safe_ip(&client_ip),
        epoch: Utc::now().timestamp(),
    }
}
