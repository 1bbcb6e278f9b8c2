//! Shutdown coordination.
//!
//! # Responsibilities
//! - Broadcast a shutdown signal to long-running tasks
//! - Own the background tasks (stats reporter, log shipper) and stop them in order

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::DeadendConfig;
use crate::observability::LogShipper;
use crate::stats::{RequestStats, StatsReporter};

/// Bound on joining the stats reporter.
const REPORTER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// The process's background tasks.
pub struct BackgroundTasks {
    shutdown: Shutdown,
    reporter: Mutex<Option<JoinHandle<u64>>>,
    shipper: Option<Arc<LogShipper>>,
    stopped: AtomicBool,
}

impl BackgroundTasks {
    /// Spawn the stats reporter (unless in test mode) and take ownership of the shipper.
    pub fn start(
        config: &DeadendConfig,
        stats: Arc<RequestStats>,
        shipper: Option<Arc<LogShipper>>,
    ) -> Self {
        let shutdown = Shutdown::new();
        let reporter = if config.testing {
            tracing::info!("Test mode: stats reporter disabled");
            None
        } else {
            let reporter = StatsReporter::new(stats, &config.stats);
            Some(tokio::spawn(reporter.run(shutdown.subscribe())))
        };

        Self {
            shutdown,
            reporter: Mutex::new(reporter),
            shipper,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn shutdown_handle(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn has_reporter(&self) -> bool {
        self.reporter
            .lock()
            .expect("reporter handle mutex poisoned")
            .is_some()
    }

    /// Stop the reporter, then flush and stop the shipper. Idempotent.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Stopping background tasks");
        self.shutdown.trigger();

        let reporter = self
            .reporter
            .lock()
            .expect("reporter handle mutex poisoned")
            .take();
        if let Some(handle) = reporter {
            match tokio::time::timeout(REPORTER_JOIN_TIMEOUT, handle).await {
                Ok(Ok(emitted)) => tracing::info!(emitted, "Stats reporter stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "Stats reporter failed"),
                Err(_) => tracing::warn!("Stats reporter did not stop cleanly"),
            }
        }

        if let Some(shipper) = &self.shipper {
            shipper.shutdown().await;
        }
        tracing::info!("Background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_broadcast() {
        let shutdown = Shutdown::new();
        let mut rx1 = shutdown.subscribe();
        let mut rx2 = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_background_tasks_stop_reporter() {
        let config = DeadendConfig::default();
        let stats = Arc::new(RequestStats::new(&config.stats));
        let tasks = BackgroundTasks::start(&config, stats, None);
        assert!(tasks.has_reporter());

        tasks.shutdown().await;
        assert!(!tasks.has_reporter());
        tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_testing_mode_skips_reporter() {
        let config = DeadendConfig {
            testing: true,
            ..DeadendConfig::default()
        };
        let stats = Arc::new(RequestStats::new(&config.stats));
        let tasks = BackgroundTasks::start(&config, stats, None);
        assert!(!tasks.has_reporter());
        tasks.shutdown().await;
    }
}
