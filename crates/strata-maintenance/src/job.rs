use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_store::ConfigProvider;
use tracing::info;

use crate::error::MaintenanceResult;
use crate::progress::{ProgressMetrics, ProgressReport};
use crate::rebalancer::Rebalancer;
use crate::walker::{FileVisitor, TreeWalker, WalkerOptions};

/// Whether a maintenance pass is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Idle,
    Maintaining,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "IDLE"),
            JobState::Maintaining => write!(f, "MAINTAINING"),
        }
    }
}

/// Point-in-time view of the maintenance job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub metrics: ProgressMetrics,
}

impl JobStatus {
    pub fn idle() -> Self {
        Self {
            state: JobState::Idle,
            metrics: ProgressMetrics::empty(),
        }
    }

    pub fn report(&self) -> JobStatusReport {
        JobStatusReport {
            state: self.state,
            progress_metrics: self.metrics.report(),
        }
    }
}

/// Wire form of [`JobStatus`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub state: JobState,
    pub progress_metrics: ProgressReport,
}

struct ActiveJob {
    generation: u64,
    walker: Arc<TreeWalker>,
}

/// Runs at most one rebalancing pass at a time.
///
/// `start` claims the running flag with a compare-and-swap, so of two
/// concurrent callers exactly one wins. The flag is released by the walker's
/// completion callback, whether the pass ran to the end or was stopped.
pub struct MaintenanceJobController {
    config: Arc<dyn ConfigProvider>,
    termination_timeout: Duration,
    running: Arc<AtomicBool>,
    active: Arc<Mutex<Option<ActiveJob>>>,
    generation: AtomicU64,
}

impl MaintenanceJobController {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self::with_termination_timeout(config, WalkerOptions::default().termination_timeout)
    }

    pub fn with_termination_timeout(
        config: Arc<dyn ConfigProvider>,
        termination_timeout: Duration,
    ) -> Self {
        Self {
            config,
            termination_timeout,
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin a pass over the data root. Returns `Ok(false)` if one is
    /// already running.
    ///
    /// The data root, target depth and worker count are read once here and
    /// hold for the whole pass. This call performs the counting walk
    /// synchronously, so it blocks for a time proportional to the tree size;
    /// async callers should run it on the blocking pool.
    pub fn start(&self) -> MaintenanceResult<bool> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        let (generation, walker) = match self.build_walker() {
            Ok(built) => built,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        *self.active.lock().expect("job lock poisoned") = Some(ActiveJob {
            generation,
            walker: Arc::clone(&walker),
        });
        info!(generation, root = %walker.root().display(), "maintenance job started");
        walker.start();
        Ok(true)
    }

    fn build_walker(&self) -> MaintenanceResult<(u64, Arc<TreeWalker>)> {
        let root = self.config.data_root()?;
        let depth = self.config.shard_depth()?;
        let options = WalkerOptions {
            concurrency: self.config.maintenance_concurrency(),
            termination_timeout: self.termination_timeout,
        };

        let rebalancer = Arc::new(Rebalancer::new(root.clone(), depth));
        let visitor: FileVisitor =
            Arc::new(move |path: &Path, depth: usize| rebalancer.maintain_file(path, depth));

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let running = Arc::clone(&self.running);
        let active = Arc::clone(&self.active);
        let completion = Box::new(move || {
            let mut slot = active.lock().expect("job lock poisoned");
            if slot.as_ref().is_some_and(|job| job.generation == generation) {
                *slot = None;
            }
            drop(slot);
            running.store(false, Ordering::SeqCst);
            info!(generation, "maintenance job finished");
        });

        let walker = TreeWalker::new(root, options, visitor, completion)?;
        Ok((generation, Arc::new(walker)))
    }

    /// Stop the running pass. Returns `false` if nothing was running.
    ///
    /// A pass that is still being set up is waited for, then stopped. Waits
    /// up to the termination timeout for in-flight folders to unwind.
    pub async fn stop(&self) -> bool {
        loop {
            if !self.is_running() {
                return false;
            }
            if let Some(walker) = self.active_walker() {
                walker.terminate().await;
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Current state, with live metrics while a pass is running. A pass that
    /// has been claimed but not yet set up reports empty metrics.
    pub fn status(&self) -> JobStatus {
        if !self.is_running() {
            return JobStatus::idle();
        }
        let metrics = self
            .active_walker()
            .map(|walker| walker.snapshot())
            .unwrap_or_else(ProgressMetrics::empty);
        JobStatus {
            state: JobState::Maintaining,
            metrics,
        }
    }

    fn active_walker(&self) -> Option<Arc<TreeWalker>> {
        self.active
            .lock()
            .expect("job lock poisoned")
            .as_ref()
            .map(|job| Arc::clone(&job.walker))
    }

    /// Resolve once no pass is running.
    pub async fn wait_until_idle(&self) {
        if let Some(walker) = self.active_walker() {
            walker.wait().await;
        }
        while self.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
