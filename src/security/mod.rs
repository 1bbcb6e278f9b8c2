//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (URL length → 414, body size → 413)
//!     → [capture + catch-all]
//!
//! GET /deadend-status:
//!     → access_control.rs (client IP in allow-list?) → 200 | 204
//! ```
//!
//! # Design Decisions
//! - Denied status probes get 204, indistinguishable from an unmatched route
//! - Limit violations are recorded like any other request

pub mod access_control;
pub mod limits;

pub use access_control::{AccessList, AccessListError};
pub use limits::{LimitViolation, RequestLimits};
