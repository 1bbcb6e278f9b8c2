//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Service config (once, at startup):
//!     defaults
//!     → loader.rs (optional TOML file, then environment overlay)
//!     → validation.rs (normalise + semantic checks)
//!     → DeadendConfig (immutable, shared via Arc)
//!
//! Route table (every request):
//!     RESPONSES_FILE
//!     → responses.rs (YAML → ordered RouteTable, bad entries skipped)
//!     → routing::resolver
//! ```
//!
//! # Design Decisions
//! - The route table is re-read per request; no reload signal, no shared mutable table
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod responses;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use responses::{ResponseSpec, Route, RouteTable};
pub use schema::{
    DeadendConfig, GelfConfig, HealthcheckConfig, ObservabilityConfig, ResponsesConfig,
    ServerConfig, StatsConfig,
};
