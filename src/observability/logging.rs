//! Structured logging setup.
//!
//! # Responsibilities
//! - Install the global tracing subscriber once at startup
//! - Map the `DEBUG_LEVEL` vocabulary onto tracing levels
//!
//! # Design Decisions
//! - `RUST_LOG` wins over `DEBUG_LEVEL` when set
//! - Unknown levels fall back to `debug` rather than failing startup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing level directive for a `DEBUG_LEVEL` value.
pub fn level_directive(debug_level: &str) -> &'static str {
    match debug_level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "debug",
    }
}

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(debug_level: &str) -> String {
    format!("web_deadend={},tower_http=info", level_directive(debug_level))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(debug_level: &str) {
    let result = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(debug_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("info"), "info");
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive(" error "), "error");
    }

    #[test]
    fn test_unknown_level_is_debug() {
        assert_eq!(level_directive("verbose"), "debug");
        assert_eq!(level_directive(""), "debug");
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("INFO"), "web_deadend=info,tower_http=info");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing("INFO");
        init_tracing("DEBUG");
    }
}
