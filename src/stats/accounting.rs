//! Request accounting.
//!
//! # Responsibilities
//! - Record each completed request into the bounded counters
//! - Keep byte totals and an error breakdown (status ≥ 400)
//! - Keep a bounded ring of recent requests for the requests-per-minute window
//! - Produce point-in-time `StatsSnapshot`s
//!
//! # Design Decisions
//! - Constructed once and owned by the server state, never global
//! - Each structure has its own lock; no lock is held across I/O
//! - Snapshots are best-effort reads, not a consistent cut

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::StatsConfig;
use crate::stats::bounded::{FifoSet, LruCounter};

/// Window for `requests_per_minute`.
const RATE_WINDOW_SECS: i64 = 60;

/// Facts about one finished request needed for accounting.
#[derive(Debug, Clone)]
pub struct CompletedRequest {
    pub method: String,
    pub path: String,
    pub query_params: Map<String, Value>,
    pub host: String,
    pub client_ip: String,
    pub status: u16,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Entry in the recent-requests ring.
#[derive(Debug, Clone)]
pub struct RecentRequest {
    pub method: String,
    pub path: String,
    pub query_params: Map<String, Value>,
    pub host: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests_per_minute: usize,
    pub total_requests: usize,
    pub unique_ips: usize,
    #[serde(serialize_with = "ordered_map")]
    pub top_paths: Vec<(String, u64)>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub errors: BTreeMap<u16, u64>,
    /// Epoch seconds.
    pub timestamp: f64,
}

impl StatsSnapshot {
    /// True if any field other than `timestamp` differs.
    pub fn changed_since(&self, previous: &StatsSnapshot) -> bool {
        self.requests_per_minute != previous.requests_per_minute
            || self.total_requests != previous.total_requests
            || self.unique_ips != previous.unique_ips
            || self.top_paths != previous.top_paths
            || self.bytes_received != previous.bytes_received
            || self.bytes_sent != previous.bytes_sent
            || self.errors != previous.errors
    }
}

fn ordered_map<S: Serializer>(entries: &[(String, u64)], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
}

/// Shared accounting state for the whole process.
#[derive(Debug)]
pub struct RequestStats {
    paths: LruCounter<String>,
    ips: FifoSet<String>,
    errors: Mutex<BTreeMap<u16, u64>>,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    recent: Mutex<VecDeque<RecentRequest>>,
    recent_capacity: usize,
    top_paths: usize,
}

impl RequestStats {
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            paths: LruCounter::new(config.path_capacity),
            ips: FifoSet::new(config.ip_capacity),
            errors: Mutex::new(BTreeMap::new()),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::new()),
            recent_capacity: config.recent_capacity.max(1),
            top_paths: config.top_paths,
        }
    }

    /// Record a finished request at the current time.
    pub fn record(&self, request: &CompletedRequest) {
        self.record_at(request, Utc::now());
    }

    /// Record a finished request observed at `at`.
    pub fn record_at(&self, request: &CompletedRequest, at: DateTime<Utc>) {
        self.paths.increment(request.path.clone(), 1);
        self.ips.add(request.client_ip.clone());

        if request.status >= 400 {
            let mut errors = self.errors.lock().expect("error counter mutex poisoned");
            *errors.entry(request.status).or_insert(0) += 1;
        }

        self.bytes_received
            .fetch_add(request.bytes_received, Ordering::Relaxed);
        self.bytes_sent.fetch_add(request.bytes_sent, Ordering::Relaxed);

        let mut recent = self.recent.lock().expect("recent requests mutex poisoned");
        if recent.len() >= self.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(RecentRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            query_params: request.query_params.clone(),
            host: request.host.clone(),
            timestamp: at,
        });
    }

    /// Snapshot as of now.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Snapshot with the rate window ending at `now`.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> StatsSnapshot {
        let (requests_per_minute, total_requests) = {
            let recent = self.recent.lock().expect("recent requests mutex poisoned");
            let in_window = recent
                .iter()
                .filter(|r| (now - r.timestamp).num_seconds() <= RATE_WINDOW_SECS)
                .count();
            (in_window, recent.len())
        };
        let errors = self
            .errors
            .lock()
            .expect("error counter mutex poisoned")
            .clone();

        StatsSnapshot {
            requests_per_minute,
            total_requests,
            unique_ips: self.ips.size(),
            top_paths: self.paths.most_common(self.top_paths),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            errors,
            timestamp: now.timestamp_millis() as f64 / 1000.0,
        }
    }

    /// Current count for one path.
    pub fn path_count(&self, path: &str) -> u64 {
        self.paths.get(&path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(path: &str, ip: &str, status: u16) -> CompletedRequest {
        CompletedRequest {
            method: "GET".into(),
            path: path.into(),
            query_params: Map::new(),
            host: "localhost".into(),
            client_ip: ip.into(),
            status,
            bytes_received: 10,
            bytes_sent: 4,
        }
    }

    fn small_config() -> StatsConfig {
        StatsConfig {
            path_capacity: 3,
            ip_capacity: 2,
            recent_capacity: 5,
            top_paths: 2,
            ..StatsConfig::default()
        }
    }

    #[test]
    fn test_record_updates_all_counters() {
        let stats = RequestStats::new(&StatsConfig::default());
        stats.record(&request("/a", "1.1.1.1", 204));
        stats.record(&request("/a", "1.1.1.1", 404));
        stats.record(&request("/b", "2.2.2.2", 500));

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.requests_per_minute, 3);
        assert_eq!(snap.unique_ips, 2);
        assert_eq!(snap.top_paths[0], ("/a".to_string(), 2));
        assert_eq!(snap.bytes_received, 30);
        assert_eq!(snap.bytes_sent, 12);
        assert_eq!(snap.errors, BTreeMap::from([(404, 1), (500, 1)]));
        assert_eq!(stats.path_count("/a"), 2);
    }

    #[test]
    fn test_bounded_structures() {
        let stats = RequestStats::new(&small_config());
        for i in 0..10 {
            stats.record(&request(&format!("/p{i}"), &format!("10.0.0.{i}"), 200));
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 5);
        assert_eq!(snap.unique_ips, 2);
        assert_eq!(snap.top_paths.len(), 2);
    }

    #[test]
    fn test_rate_window() {
        let stats = RequestStats::new(&StatsConfig::default());
        let now = Utc::now();
        stats.record_at(&request("/old", "1.1.1.1", 200), now - Duration::seconds(120));
        stats.record_at(&request("/new", "1.1.1.1", 200), now - Duration::seconds(30));

        let snap = stats.snapshot_at(now);
        assert_eq!(snap.requests_per_minute, 1);
        assert_eq!(snap.total_requests, 2);
    }

    #[test]
    fn test_change_detection_ignores_timestamp() {
        let stats = RequestStats::new(&StatsConfig::default());
        stats.record(&request("/a", "1.1.1.1", 200));
        let now = Utc::now();
        let first = stats.snapshot_at(now);
        let second = stats.snapshot_at(now + Duration::seconds(1));
        assert!(!second.changed_since(&first));

        stats.record(&request("/a", "1.1.1.1", 200));
        assert!(stats.snapshot_at(now).changed_since(&first));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let stats = RequestStats::new(&StatsConfig::default());
        stats.record(&request("/x", "1.1.1.1", 404));
        let value = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(value["top_paths"]["/x"], 1);
        assert_eq!(value["errors"]["404"], 1);
        assert!(value["timestamp"].is_f64());
    }
}
