//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the honeypot.
//! All types derive Serde traits for deserialization from config files; every
//! section has defaults so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DeadendConfig {
    /// Listener and request limits.
    pub server: ServerConfig,

    /// Route table location and matching mode.
    pub responses: ResponsesConfig,

    /// Background stats reporter.
    pub stats: StatsConfig,

    /// Remote GELF log shipping.
    pub gelf: GelfConfig,

    /// Status endpoint access.
    pub healthcheck: HealthcheckConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Test mode: disables the stats reporter.
    pub testing: bool,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub host: String,

    /// Listen port; also exposed to templates as `request.port`.
    pub port: u16,

    /// Maximum length of path plus query string.
    pub max_url_length: usize,

    /// Maximum request body size in bytes.
    pub max_content_length: usize,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_url_length: 65_536,
            max_content_length: 100 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Route table configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResponsesConfig {
    /// YAML route table, re-read on every request.
    pub file: String,

    /// Restrict `%IP%` and `%EPOCH%` wildcard values.
    pub strict_wildcards: bool,
}

impl Default for ResponsesConfig {
    fn default() -> Self {
        Self {
            file: "responses.yaml".to_string(),
            strict_wildcards: false,
        }
    }
}

/// Stats reporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    /// "json" or "text"; anything else is normalised to "json".
    pub log_format: String,

    /// Seconds between snapshots.
    pub interval_secs: u64,

    /// Seconds after which an unchanged snapshot is still emitted.
    pub heartbeat_interval_secs: u64,

    /// Distinct paths retained by the path counter.
    pub path_capacity: usize,

    /// Client IPs retained by the unique-IP window.
    pub ip_capacity: usize,

    /// Entries retained for the requests-per-minute window.
    pub recent_capacity: usize,

    /// Paths listed in each snapshot.
    pub top_paths: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            log_format: "json".to_string(),
            interval_secs: 60,
            heartbeat_interval_secs: 3600,
            path_capacity: 10_000,
            ip_capacity: 50_000,
            recent_capacity: 100_000,
            top_paths: 10,
        }
    }
}

/// GELF shipping configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GelfConfig {
    /// `udp://host:port` or `tcp://host:port`; unset disables shipping.
    pub server: Option<String>,

    /// Bounded queue capacity.
    pub queue_size: usize,

    /// Seconds shutdown waits for the queue to drain.
    pub flush_timeout_secs: u64,

    /// Serialized field size above which body/query fields are stripped.
    pub max_payload_bytes: usize,
}

impl Default for GelfConfig {
    fn default() -> Self {
        Self {
            server: None,
            queue_size: 10_000,
            flush_timeout_secs: 30,
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Status endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthcheckConfig {
    /// Comma-separated CIDR ranges or addresses allowed to see the status body.
    pub allowed: String,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            allowed: "0.0.0.0/0,::/0".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL.
    pub debug_level: String,

    /// Prometheus scrape address; unset disables the exporter.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            debug_level: "INFO".to_string(),
            metrics_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config: DeadendConfig = toml::from_str("").unwrap();
        assert_eq!(config, DeadendConfig::default());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.gelf.queue_size, 10_000);
        assert_eq!(config.healthcheck.allowed, "0.0.0.0/0,::/0");
    }

    #[test]
    fn test_partial_sections() {
        let config: DeadendConfig = toml::from_str(
            r#"
            testing = true

            [server]
            port = 8080

            [gelf]
            server = "udp://graylog:12201"
            "#,
        )
        .unwrap();
        assert!(config.testing);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_url_length, 65_536);
        assert_eq!(config.gelf.server.as_deref(), Some("udp://graylog:12201"));
        assert_eq!(config.gelf.flush_timeout_secs, 30);
    }

    #[test]
    fn test_bind_address() {
        let mut server = ServerConfig::default();
        assert_eq!(server.bind_address(), "0.0.0.0:3000");
        server.host = "::".into();
        assert_eq!(server.bind_address(), "[::]:3000");
    }
}
