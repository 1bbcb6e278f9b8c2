//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, ConnectInfo)
//!     → request.rs (fresh UUIDv7, X-Request-ID)
//!     → capture.rs (414 / 413, body → body.rs, CapturedRequest extension)
//!     → server.rs handlers:
//!         GET /deadend-status → allow-list → 200 {"service":"ok"} | 204
//!         anything else → load route table → resolve → render | 204
//!     ← capture.rs (stats, access line, shipper hand-off)
//!     ← request.rs (X-Request-ID on the response)
//! ```
//!
//! # Design Decisions
//! - Every method on every path is accepted
//! - Routing and rendering run on the blocking pool (file read, regex matching)

pub mod body;
pub mod capture;
pub mod request;
pub mod server;

pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{build_router, AppState, HttpServer, STATUS_PATH};
