//! Periodic stats reporter.
//!
//! # Responsibilities
//! - Take a snapshot every interval
//! - Emit it when it differs from the last emitted one, or as a heartbeat
//!   when nothing changed for the heartbeat interval
//! - Exit promptly on shutdown
//!
//! # Design Decisions
//! - The first tick always emits (there is nothing to compare against)
//! - A change-triggered line in the same cycle replaces the heartbeat line
//! - Not started in test mode

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::StatsConfig;
use crate::stats::accounting::{RequestStats, StatsSnapshot};

/// Service name stamped on JSON stats lines.
pub const SERVICE_NAME: &str = "web-deadend";

/// Stats line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// `text` (any case) selects text; everything else is JSON.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// A snapshot selected for output.
#[derive(Debug, Clone)]
pub struct Emission {
    pub snapshot: StatsSnapshot,
    pub heartbeat: bool,
}

pub struct StatsReporter {
    stats: Arc<RequestStats>,
    format: LogFormat,
    interval: Duration,
    heartbeat_interval: Duration,
    last: Option<StatsSnapshot>,
    last_heartbeat: Instant,
}

impl StatsReporter {
    pub fn new(stats: Arc<RequestStats>, config: &StatsConfig) -> Self {
        Self {
            stats,
            format: LogFormat::parse(&config.log_format),
            interval: Duration::from_secs(config.interval_secs.max(1)),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
            last: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Run until shutdown; returns the number of lines emitted.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            heartbeat_secs = self.heartbeat_interval.as_secs(),
            format = ?self.format,
            "Stats reporter starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        let mut emitted = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.stats.snapshot();
                    if let Some(emission) = self.evaluate(snapshot, Instant::now()) {
                        tracing::info!(target: "web_deadend::stats", "{}", format_line(&emission, self.format));
                        emitted += 1;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Stats reporter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
        emitted
    }

    /// Decide whether `snapshot` taken at `now` is emitted.
    pub fn evaluate(&mut self, snapshot: StatsSnapshot, now: Instant) -> Option<Emission> {
        let changed = self
            .last
            .as_ref()
            .map_or(true, |last| snapshot.changed_since(last));
        let heartbeat_due = now.duration_since(self.last_heartbeat) >= self.heartbeat_interval;

        if !changed && !heartbeat_due {
            return None;
        }

        self.last = Some(snapshot.clone());
        if heartbeat_due {
            self.last_heartbeat = now;
        }
        Some(Emission {
            snapshot,
            heartbeat: heartbeat_due && !changed,
        })
    }
}

/// Render one stats line.
pub fn format_line(emission: &Emission, format: LogFormat) -> String {
    let stats = &emission.snapshot;
    match format {
        LogFormat::Json => {
            let mut value = serde_json::to_value(stats).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut value {
                map.insert("heartbeat".into(), Value::Bool(emission.heartbeat));
                map.insert("service".into(), Value::from(SERVICE_NAME));
                map.insert("version".into(), Value::from(env!("CARGO_PKG_VERSION")));
            }
            value.to_string()
        }
        LogFormat::Text => {
            let prefix = if emission.heartbeat { "[HEARTBEAT]" } else { "[STATS]" };
            let mut line = format!(
                "{prefix} Requests/min: {}, Unique IPs: {}, Total requests: {}, Traffic: {}↓ / {}↑ bytes",
                stats.requests_per_minute,
                stats.unique_ips,
                stats.total_requests,
                stats.bytes_received,
                stats.bytes_sent,
            );
            if !stats.errors.is_empty() {
                let errors: Vec<String> = stats
                    .errors
                    .iter()
                    .map(|(status, count)| format!("{status}: {count}"))
                    .collect();
                line.push_str(&format!(", Errors: {{{}}}", errors.join(", ")));
            }
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::stats::accounting::CompletedRequest;
    use serde_json::Map;

    fn config() -> StatsConfig {
        StatsConfig {
            interval_secs: 60,
            heartbeat_interval_secs: 3600,
            ..StatsConfig::default()
        }
    }

    fn hit(stats: &RequestStats, status: u16) {
        stats.record(&CompletedRequest {
            method: "GET".into(),
            path: "/".into(),
            query_params: Map::new(),
            host: "h".into(),
            client_ip: "1.2.3.4".into(),
            status,
            bytes_received: 1,
            bytes_sent: 0,
        });
    }

    #[tokio::test]
    async fn test_first_tick_emits_then_only_on_change() {
        let stats = Arc::new(RequestStats::new(&config()));
        let mut reporter = StatsReporter::new(stats.clone(), &config());
        let start = Instant::now();

        let first = reporter.evaluate(stats.snapshot(), start).unwrap();
        assert!(!first.heartbeat);

        assert!(reporter
            .evaluate(stats.snapshot(), start + Duration::from_secs(60))
            .is_none());

        hit(&stats, 200);
        let changed = reporter
            .evaluate(stats.snapshot(), start + Duration::from_secs(120))
            .unwrap();
        assert!(!changed.heartbeat);
    }

    #[tokio::test]
    async fn test_heartbeat_when_unchanged() {
        let stats = Arc::new(RequestStats::new(&config()));
        let mut reporter = StatsReporter::new(stats.clone(), &config());
        let start = Instant::now();

        reporter.evaluate(stats.snapshot(), start).unwrap();
        let beat = reporter
            .evaluate(stats.snapshot(), start + Duration::from_secs(3600))
            .unwrap();
        assert!(beat.heartbeat);

        // heartbeat clock was reset
        assert!(reporter
            .evaluate(stats.snapshot(), start + Duration::from_secs(3660))
            .is_none());
    }

    #[tokio::test]
    async fn test_change_suppresses_heartbeat_flag() {
        let stats = Arc::new(RequestStats::new(&config()));
        let mut reporter = StatsReporter::new(stats.clone(), &config());
        let start = Instant::now();

        reporter.evaluate(stats.snapshot(), start).unwrap();
        hit(&stats, 404);
        let emission = reporter
            .evaluate(stats.snapshot(), start + Duration::from_secs(3600))
            .unwrap();
        assert!(!emission.heartbeat);
    }

    #[test]
    fn test_text_format() {
        let stats = RequestStats::new(&config());
        hit(&stats, 404);
        hit(&stats, 404);
        let emission = Emission {
            snapshot: stats.snapshot(),
            heartbeat: false,
        };
        assert_eq!(
            format_line(&emission, LogFormat::Text),
            "[STATS] Requests/min: 2, Unique IPs: 1, Total requests: 2, Traffic: 2↓ / 0↑ bytes, Errors: {404: 2}"
        );

        let quiet = Emission {
            snapshot: RequestStats::new(&config()).snapshot(),
            heartbeat: true,
        };
        assert!(format_line(&quiet, LogFormat::Text).starts_with("[HEARTBEAT] "));
        assert!(!format_line(&quiet, LogFormat::Text).contains("Errors"));
    }

    #[test]
    fn test_json_format() {
        let stats = RequestStats::new(&config());
        let emission = Emission {
            snapshot: stats.snapshot(),
            heartbeat: true,
        };
        let value: Value = serde_json::from_str(&format_line(&emission, LogFormat::Json)).unwrap();
        assert_eq!(value["heartbeat"], true);
        assert_eq!(value["service"], "web-deadend");
        assert_eq!(value["requests_per_minute"], 0);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("TEXT"), LogFormat::Text);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("yaml"), LogFormat::Json);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_and_stops_on_shutdown() {
        let stats = Arc::new(RequestStats::new(&config()));
        let reporter = StatsReporter::new(stats.clone(), &config());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(reporter.run(shutdown.subscribe()));

        // first tick emits, second is unchanged, third sees a new request
        time::sleep(Duration::from_secs(61)).await;
        time::sleep(Duration::from_secs(60)).await;
        hit(&stats, 200);
        time::sleep(Duration::from_secs(60)).await;

        shutdown.trigger();
        let emitted = handle.await.unwrap();
        assert_eq!(emitted, 2);
    }
}
