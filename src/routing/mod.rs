//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → resolver.rs (scan RouteTable in file order)
//!     → matcher.rs (exact / %WILDCARD% / {placeholder} / r/regex)
//!     → regex_guard.rs (shape check + deadline, regex routes only)
//!     → Return: Resolution (spec + path variables) or no match
//! ```
//!
//! # Design Decisions
//! - First match wins, independent of specificity
//! - Each pattern selects exactly one strategy from its own text
//! - Deterministic: same table and input always resolve the same way
//! - Regex failures degrade to no-match; they never fail the request

pub mod matcher;
pub mod regex_guard;
pub mod resolver;

pub use matcher::{match_route, MatchMode, PathVariables, RouteMatcher};
pub use resolver::{resolve, RenderedResponse, Resolution, ResponseError};
