//! Asynchronous log shipper.
//!
//! # Responsibilities
//! - Accept request records without ever blocking the request path
//! - Count and report records dropped on a full queue
//! - Keep each shipped payload under the size limit
//! - Forward records to a `Transport` from a single consumer task
//! - Drain and stop on shutdown within bounded time
//!
//! # Design Decisions
//! - Bounded mpsc queue, `try_send` only on the producer side
//! - One consumer; transport failures are logged, never retried
//! - Shutdown is a sentinel in the same queue, so queued records ship first
//! - Shutdown is idempotent

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::GelfConfig;
use crate::observability::access_log::RequestRecord;
use crate::observability::gelf::{self, GelfEndpoint, GelfTransport};
use crate::observability::metrics;

/// Consumer wake-up period while idle.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Bound on joining the consumer after the drain wait.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drops between saturation reports.
const DROP_REPORT_EVERY: u64 = 100;

const BODY_REMOVED: &str = "Request body too large, removed to prevent payload overflow";

/// Failure delivering one entry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("message of {size} bytes needs {chunks} chunks")]
    TooLarge { size: usize, chunks: usize },
    #[error("unsupported log transport scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid log endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// One record ready for shipping.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub message: String,
    /// Epoch seconds.
    pub timestamp: f64,
    pub fields: Map<String, Value>,
}

/// Delivers entries to the log collector.
pub trait Transport: Send + 'static {
    fn send(&mut self, entry: &LogEntry) -> impl Future<Output = Result<(), TransportError>> + Send;
}

enum Command {
    Entry(LogEntry),
    Shutdown,
}

pub struct LogShipper {
    tx: mpsc::Sender<Command>,
    capacity: usize,
    max_payload_bytes: usize,
    flush_timeout: Duration,
    drops: AtomicU64,
    closed: AtomicBool,
    consumer: Mutex<Option<JoinHandle<u64>>>,
}

impl LogShipper {
    /// Shipper for the configured GELF server, if any.
    pub fn from_config(config: &GelfConfig) -> Option<Self> {
        let Some(server) = config.server.as_deref().filter(|s| !s.trim().is_empty()) else {
            tracing::warn!("No GELF server specified; log shipping disabled");
            return None;
        };
        match GelfEndpoint::parse(server.trim()) {
            Ok(endpoint) => {
                tracing::info!(
                    endpoint = %endpoint,
                    queue_size = config.queue_size,
                    "Async GELF logging enabled"
                );
                Some(Self::start(GelfTransport::new(endpoint), config))
            }
            Err(e) => {
                tracing::error!(server = %server, error = %e, "Unsupported GELF server; log shipping disabled");
                None
            }
        }
    }

    /// Spawn the consumer task for `transport`.
    pub fn start<T: Transport>(transport: T, config: &GelfConfig) -> Self {
        let capacity = config.queue_size.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let consumer = tokio::spawn(consume(transport, rx));

        Self {
            tx,
            capacity,
            max_payload_bytes: config.max_payload_bytes,
            flush_timeout: Duration::from_secs(config.flush_timeout_secs),
            drops: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// Queue `record` for shipping. Returns false if it was dropped.
    pub fn submit(&self, record: &RequestRecord) -> bool {
        let mut fields = record.shipping_fields();
        limit_payload(&mut fields, self.max_payload_bytes);
        self.enqueue(LogEntry {
            message: record.message(),
            timestamp: gelf::epoch_seconds(),
            fields,
        })
    }

    /// Non-blocking enqueue of a prepared entry.
    pub fn enqueue(&self, entry: LogEntry) -> bool {
        match self.tx.try_send(Command::Entry(entry)) {
            Ok(()) => {
                metrics::record_queue_depth(self.queued());
                true
            }
            Err(TrySendError::Full(_)) => {
                self.record_drop();
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Log shipper closed, entry discarded");
                false
            }
        }
    }

    fn record_drop(&self) {
        let drops = self.drops.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_log_drop();

        if drops % DROP_REPORT_EVERY == 0 {
            tracing::error!(
                total_drops = drops,
                queued = self.queued(),
                capacity = self.capacity,
                "GELF queue saturated; log shipping is falling behind (attack in progress or collector slow)"
            );
        } else if drops == 1 {
            tracing::warn!(
                capacity = self.capacity,
                "GELF queue full, starting to drop log entries"
            );
        }
    }

    /// Total entries dropped so far.
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Entries waiting in the queue.
    pub fn queued(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Flush and stop the consumer. Later calls return immediately.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let pending = self.queued();
        if pending > 0 {
            tracing::info!(pending, "Flushing GELF log entries");
        }

        let deadline = Instant::now() + self.flush_timeout;
        if time::timeout_at(deadline, self.tx.send(Command::Shutdown))
            .await
            .is_err()
        {
            tracing::warn!("Timed out queueing shutdown for the GELF worker");
        }
        while self.queued() > 0 && Instant::now() < deadline {
            time::sleep(Duration::from_millis(50)).await;
        }
        let remaining = self.queued();
        if remaining > 0 {
            tracing::warn!(remaining, "Timed out flushing GELF queue, entries lost");
        } else {
            tracing::info!("GELF queue flushed");
        }

        let consumer = self
            .consumer
            .lock()
            .expect("shipper consumer mutex poisoned")
            .take();
        if let Some(handle) = consumer {
            match time::timeout(JOIN_TIMEOUT, handle).await {
                Ok(Ok(sent)) => tracing::info!(sent, "GELF worker stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "GELF worker failed"),
                Err(_) => tracing::warn!("GELF worker did not stop cleanly"),
            }
        }
        tracing::info!(total_drops = self.drops(), "Log shipper shut down");
    }
}

/// Consumer loop; returns the number of entries delivered.
async fn consume<T: Transport>(mut transport: T, mut rx: mpsc::Receiver<Command>) -> u64 {
    let mut sent = 0;
    loop {
        match time::timeout(RECV_TIMEOUT, rx.recv()).await {
            Ok(Some(Command::Entry(entry))) => match transport.send(&entry).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!(error = %e, message = %entry.message, "Failed to ship log entry"),
            },
            Ok(Some(Command::Shutdown)) | Ok(None) => break,
            Err(_) => continue,
        }
    }
    sent
}

/// Strip flattened and nested request data when the payload is over `max_bytes`.
pub fn limit_payload(fields: &mut Map<String, Value>, max_bytes: usize) -> bool {
    let size = serde_json::to_vec(&*fields).map(|v| v.len()).unwrap_or(0);
    if size <= max_bytes {
        return false;
    }

    tracing::warn!(size, max_bytes, "GELF payload over the size limit; removing body and query fields");
    fields.retain(|key, _| !(key.starts_with("body_") || key.starts_with("query_")));
    fields.insert("body".into(), Value::from(BODY_REMOVED));
    fields.insert("query_params".into(), Value::Object(Map::new()));
    true
}
