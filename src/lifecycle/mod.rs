//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init tracing → Metrics → Log shipper → Stats reporter
//!     → Lint route table → Bind listener → Serve
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop accepting, finish in-flight requests
//!
//! Shutdown (shutdown.rs):
//!     broadcast → join reporter (5s) → shipper sentinel + drain (30s) → join (5s)
//! ```
//!
//! # Design Decisions
//! - Every wait during shutdown is bounded
//! - Shutdown is idempotent

pub mod shutdown;
pub mod signals;

pub use shutdown::{BackgroundTasks, Shutdown};
pub use signals::shutdown_signal;
