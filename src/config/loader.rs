//! Configuration loading.
//!
//! # Responsibilities
//! - Read the optional TOML file
//! - Overlay environment variables (names kept from the deployed service)
//! - Normalise and validate the result
//!
//! # Design Decisions
//! - Env overlay is a pure function over a lookup closure, so it is tested
//!   without touching the process environment
//! - Unparseable numbers are errors; unknown enum-like strings are not

use std::fs;
use std::path::Path;

use crate::config::schema::DeadendConfig;
use crate::config::validation::{normalize_config, validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file without env overlay or validation.
pub fn load_config_file(path: &Path) -> Result<DeadendConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Defaults (or `path`), then env vars read through `lookup`, then
/// `overrides` (command-line flags), then validation.
pub fn load_config<L, O>(
    path: Option<&Path>,
    lookup: L,
    overrides: O,
) -> Result<DeadendConfig, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    O: FnOnce(&mut DeadendConfig),
{
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => DeadendConfig::default(),
    };
    apply_env(&mut config, lookup)?;
    overrides(&mut config);
    finish(config)
}

/// Normalise and validate a fully assembled config.
pub fn finish(mut config: DeadendConfig) -> Result<DeadendConfig, ConfigError> {
    normalize_config(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment variables read through `lookup`.
pub fn apply_env<F>(config: &mut DeadendConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string());

    if let Some(v) = get("PORT") {
        config.server.port = parse_number("PORT", &v)?;
    }
    if let Some(v) = get("MAX_URL_LENGTH") {
        config.server.max_url_length = parse_number("MAX_URL_LENGTH", &v)?;
    }
    if let Some(v) = get("MAX_CONTENT_LENGTH") {
        config.server.max_content_length = parse_number("MAX_CONTENT_LENGTH", &v)?;
    }
    if let Some(v) = get("RESPONSES_FILE").filter(|v| !v.is_empty()) {
        config.responses.file = v;
    }
    if let Some(v) = get("STRICT_WILDCARDS") {
        config.responses.strict_wildcards = parse_flag(&v);
    }
    if let Some(v) = get("LOG_FORMAT") {
        config.stats.log_format = v.to_lowercase();
    }
    if let Some(v) = get("LOG_STATS_INTERVAL") {
        config.stats.interval_secs = parse_number("LOG_STATS_INTERVAL", &v)?;
    }
    if let Some(v) = get("LOG_HEARTBEAT_INTERVAL") {
        config.stats.heartbeat_interval_secs = parse_number("LOG_HEARTBEAT_INTERVAL", &v)?;
    }
    if let Some(v) = get("GELF_SERVER") {
        config.gelf.server = (!v.is_empty()).then_some(v);
    }
    if let Some(v) = get("GELF_QUEUE_SIZE") {
        config.gelf.queue_size = parse_number("GELF_QUEUE_SIZE", &v)?;
    }
    if let Some(v) = get("HEALTHCHECK_ALLOWED") {
        config.healthcheck.allowed = v;
    }
    if let Some(v) = get("DEBUG_LEVEL") {
        config.observability.debug_level = v;
    }
    if let Some(v) = get("METRICS_ADDRESS") {
        config.observability.metrics_address = (!v.is_empty()).then_some(v);
    }
    if let Some(v) = lookup("TESTING") {
        config.testing = !v.is_empty();
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
