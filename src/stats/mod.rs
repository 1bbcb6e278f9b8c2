//! Request statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Request path (per completed request):
//!     CompletedRequest
//!     → accounting.rs (path LRU, IP FIFO, errors, bytes, recent ring)
//!
//! Background (one task):
//!     reporter.rs ticks every interval
//!     → RequestStats::snapshot()
//!     → emit on change or heartbeat (json | text)
//! ```
//!
//! # Design Decisions
//! - Every structure is bounded by capacity; memory does not grow with traffic
//! - Counters are owned by the server state and shared through Arc
//! - Snapshots are best-effort reads, not a consistent cut

pub mod accounting;
pub mod bounded;
pub mod reporter;

pub use accounting::{CompletedRequest, RequestStats, StatsSnapshot};
pub use bounded::{FifoSet, LruCounter};
pub use reporter::{LogFormat, StatsReporter};
