//! Background rebalancing for Strata.
//!
//! When the configured shard depth changes, existing objects stay where they
//! were written. A maintenance pass walks the whole data tree with a bounded
//! number of workers and moves every misplaced object to the current depth,
//! collapsing duplicate copies to the newest one on the way.
//!
//! - [`TreeWalker`]: concurrent, cancellable directory traversal
//! - [`Rebalancer`]: per-file relocation used as the walker's visitor
//! - [`MaintenanceJobController`]: one pass at a time, with start/stop/status
//! - [`ProgressMetrics`]: counters and derived estimates for status reports

pub mod error;
pub mod job;
pub mod progress;
pub mod rebalancer;
pub mod walker;

pub use error::{MaintenanceError, MaintenanceResult};
pub use job::{JobState, JobStatus, JobStatusReport, MaintenanceJobController};
pub use progress::{ProgressMetrics, ProgressReport, BAR_WIDTH};
pub use rebalancer::Rebalancer;
pub use walker::{count_entries, CompletionCallback, FileVisitor, TreeWalker, WalkerOptions};
