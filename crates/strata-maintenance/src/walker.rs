use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{MaintenanceError, MaintenanceResult};
use crate::progress::ProgressMetrics;

/// Called for every regular file with its path and the number of directories
/// between the walk root and the file.
pub type FileVisitor = Arc<dyn Fn(&Path, usize) + Send + Sync>;

/// Called once when the walk finishes or is terminated.
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Tuning for a [`TreeWalker`].
#[derive(Clone, Debug)]
pub struct WalkerOptions {
    /// Maximum number of folders processed at the same time.
    pub concurrency: usize,
    /// How long `terminate` waits for in-flight folders to unwind.
    pub termination_timeout: Duration,
}

impl Default for WalkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            termination_timeout: Duration::from_secs(60),
        }
    }
}

impl WalkerOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }
}

/// Bounded-concurrency recursive directory walker.
///
/// Each folder is one unit of work run on the blocking pool, gated by a
/// semaphore with `concurrency` permits. A unit lists the folder's children
/// in random order, submits subfolders as new units and calls the visitor
/// for files inline. The walk is finished when no unit is in flight.
///
/// Must be created inside a tokio runtime; workers are spawned on it.
pub struct TreeWalker {
    shared: Arc<Shared>,
}

struct Shared {
    root: PathBuf,
    visitor: FileVisitor,
    permits: Arc<Semaphore>,
    handle: Handle,
    termination_timeout: Duration,
    started_at: OnceLock<DateTime<Utc>>,
    to_process: AtomicU64,
    processed: AtomicU64,
    in_flight: AtomicUsize,
    cancelled: AtomicBool,
    finished: AtomicBool,
    completion: Mutex<Option<CompletionCallback>>,
    done: Notify,
}

impl TreeWalker {
    pub fn new(
        root: impl Into<PathBuf>,
        options: WalkerOptions,
        visitor: FileVisitor,
        completion: CompletionCallback,
    ) -> MaintenanceResult<Self> {
        let handle = Handle::try_current().map_err(|_| MaintenanceError::NoRuntime)?;
        Ok(Self {
            shared: Arc::new(Shared {
                root: root.into(),
                visitor,
                permits: Arc::new(Semaphore::new(options.concurrency.max(1))),
                handle,
                termination_timeout: options.termination_timeout,
                started_at: OnceLock::new(),
                to_process: AtomicU64::new(0),
                processed: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                cancelled: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                completion: Mutex::new(Some(completion)),
                done: Notify::new(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Count the tree, then begin the walk. Returns once the root folder is
    /// submitted; the traversal itself runs in the background. Calling
    /// `start` a second time has no effect.
    pub fn start(&self) {
        if self.shared.started_at.set(Utc::now()).is_err() {
            warn!(root = %self.shared.root.display(), "walker already started");
            return;
        }
        let total = count_entries(&self.shared.root);
        self.shared.to_process.store(total, Ordering::SeqCst);
        info!(root = %self.shared.root.display(), total, "tree walk started");
        self.shared.submit(self.shared.root.clone(), 0);
    }

    /// Stop the walk.
    ///
    /// New work is refused, running units stop at their next child, and this
    /// call waits up to the termination timeout for them. Afterwards the
    /// in-flight count is forced to zero and the completion callback fires
    /// if it has not already.
    pub async fn terminate(&self) {
        let shared = &self.shared;
        shared.cancelled.store(true, Ordering::SeqCst);
        shared.permits.close();
        info!(root = %shared.root.display(), "terminating tree walk");

        let drained = async {
            loop {
                let notified = shared.done.notified();
                if shared.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(shared.termination_timeout, drained)
            .await
            .is_err()
        {
            warn!(
                in_flight = shared.in_flight.load(Ordering::SeqCst),
                "workers did not unwind in time, forcing completion"
            );
        }
        shared.in_flight.store(0, Ordering::SeqCst);
        shared.complete();
        // a worker may be running the completion callback right now
        self.wait().await;
    }

    /// Wait until the walk has completed (naturally or by termination) and
    /// the completion callback has returned.
    pub async fn wait(&self) {
        loop {
            let notified = self.shared.done.notified();
            if self.is_finished() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Sample the progress counters without blocking workers.
    pub fn snapshot(&self) -> ProgressMetrics {
        ProgressMetrics {
            start_time: self.shared.started_at.get().copied(),
            status_time: Some(Utc::now()),
            number_to_process: self.shared.to_process.load(Ordering::Relaxed),
            number_processed: self.shared.processed.load(Ordering::Relaxed),
        }
    }
}

impl Shared {
    fn submit(self: &Arc<Self>, folder: PathBuf, depth: usize) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(self);
        self.handle.spawn(async move {
            let permit = match shared.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    shared.finish_unit();
                    return;
                }
            };
            if shared.cancelled.load(Ordering::SeqCst) {
                drop(permit);
                shared.finish_unit();
                return;
            }

            let worker = Arc::clone(&shared);
            let path = folder.clone();
            let result = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                worker.process_folder(&path, depth);
            })
            .await;
            if let Err(e) = result {
                error!(folder = %folder.display(), error = %e, "folder unit failed");
            }
            shared.finish_unit();
        });
    }

    fn process_folder(self: &Arc<Self>, folder: &Path, depth: usize) {
        let mut children = match fs::read_dir(folder) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_type().ok().map(|ty| (entry.path(), ty)))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "cannot list folder");
                return;
            }
        };
        children.shuffle(&mut rand::thread_rng());

        for (path, file_type) in children {
            if self.cancelled.load(Ordering::SeqCst) {
                debug!(folder = %folder.display(), "unit interrupted");
                return;
            }
            if file_type.is_dir() {
                self.submit(path, depth + 1);
            } else if file_type.is_file() {
                (self.visitor)(&path, depth);
            }
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn finish_unit(&self) {
        let previous = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.complete();
        }
    }

    fn complete(&self) {
        let callback = self
            .completion
            .lock()
            .expect("completion lock poisoned")
            .take();
        if let Some(callback) = callback {
            info!(
                root = %self.root.display(),
                processed = self.processed.load(Ordering::Relaxed),
                cancelled = self.cancelled.load(Ordering::SeqCst),
                "tree walk finished"
            );
            callback();
            self.finished.store(true, Ordering::SeqCst);
            self.done.notify_waiters();
        }
    }
}

/// Files plus folders under `root`, the root itself included. Entries that
/// cannot be read are not counted.
pub fn count_entries(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() || entry.file_type().is_dir())
        .count() as u64
}
