//! HTTP deadend honeypot library.
//!
//! Answers every request with an operator-configured canned response (or an
//! empty 204), records what the client sent, and ships the record to a log
//! collector without ever slowing the response down.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;
pub mod stats;
pub mod template;

pub use config::schema::DeadendConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::{BackgroundTasks, Shutdown};
