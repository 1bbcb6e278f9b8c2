//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every handled request:
//!     → access_log.rs (RequestRecord)
//!         → debug line on `web_deadend::access` (synchronous, stdout)
//!         → shipper.rs (try_send into bounded queue, drop + count when full)
//!             → single consumer task → gelf.rs (UDP chunked | TCP NUL-framed)
//!     → metrics.rs (request counter, latency histogram)
//!
//! Startup:
//!     → logging.rs (tracing subscriber, DEBUG_LEVEL / RUST_LOG)
//!     → metrics.rs (Prometheus exporter when METRICS_ADDRESS is set)
//! ```
//!
//! # Design Decisions
//! - Telemetry failures never reach the client
//! - Shipping happens off the request path; only the enqueue is inline
//! - The two log streams carry the same record

pub mod access_log;
pub mod gelf;
pub mod logging;
pub mod metrics;
pub mod shipper;

pub use access_log::RequestRecord;
pub use shipper::{LogEntry, LogShipper, Transport, TransportError};
