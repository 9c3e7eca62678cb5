use std::cmp::Reverse;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use strata_store::{prune_empty_ancestors, purge_file, ObjectDescriptor, StoreResult};
use strata_types::{ObjectId, ShardDepth};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Moves misplaced objects to the target depth during a maintenance pass.
///
/// A rebalancer is built per pass with the data root and depth resolved at
/// job start, so every file in one pass is measured against the same target.
#[derive(Clone, Debug)]
pub struct Rebalancer {
    root: PathBuf,
    target_depth: ShardDepth,
}

/// One same-named file found anywhere in the tree.
#[derive(Clone, Debug)]
struct Candidate {
    path: PathBuf,
    modified: SystemTime,
    depth: usize,
}

impl Rebalancer {
    pub fn new(root: impl Into<PathBuf>, target_depth: ShardDepth) -> Self {
        Self {
            root: root.into(),
            target_depth,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target_depth(&self) -> ShardDepth {
        self.target_depth
    }

    /// Tree walker callback for one regular file at `depth`.
    ///
    /// Files already at the target depth are left alone. Files whose name is
    /// not an object identifier are skipped with a warning. Failures are
    /// logged and never propagate, so one bad file cannot abort the pass.
    pub fn maintain_file(&self, path: &Path, depth: usize) {
        if depth == self.target_depth.get() {
            return;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "skipping misplaced file with unreadable name");
            return;
        };
        let id = match ObjectId::parse(name) {
            Ok(id) => id,
            Err(_) => {
                warn!(path = %path.display(), "skipping misplaced file with invalid identifier name");
                return;
            }
        };
        if let Err(e) = self.relocate(id, name) {
            error!(path = %path.display(), error = %e, "error while processing misplaced file");
        }
    }

    /// Keep the newest same-named file, place it at the target depth, and
    /// remove every other copy.
    fn relocate(&self, id: ObjectId, name: &str) -> StoreResult<()> {
        let candidates = self.find_by_name(name);
        let Some(winner) = newest(&candidates) else {
            debug!(%id, "no copies left, nothing to relocate");
            return Ok(());
        };

        let target = ObjectDescriptor::new(&self.root, id, self.target_depth)?;
        let target_path = target.path();
        let mut vacated = None;
        if winner.path != target_path {
            debug!(from = %winner.path.display(), to = %target_path.display(), "moving to requested depth");
            if let Err(e) = move_file(&winner.path, &target) {
                if e.kind() == io::ErrorKind::NotFound {
                    debug!(path = %winner.path.display(), "copy already moved by another worker");
                    return Ok(());
                }
                return Err(e.into());
            }
            vacated = winner.path.parent();
        }

        self.clear_leftovers(vacated, &[target_path.as_path(), winner.path.as_path()], &candidates);
        Ok(())
    }

    /// Prune the folder the winner left and purge every candidate not in
    /// `keep`. Failures are logged and the remaining copies still purged.
    fn clear_leftovers(&self, vacated: Option<&Path>, keep: &[&Path], candidates: &[Candidate]) {
        if let Some(folder) = vacated {
            if let Err(e) = prune_empty_ancestors(&self.root, folder) {
                warn!(path = %folder.display(), error = %e, "error pruning vacated shard folders");
            }
        }
        for candidate in candidates {
            if keep.contains(&candidate.path.as_path()) {
                continue;
            }
            purge_file(&self.root, &candidate.path);
        }
    }

    /// Every regular file under the root named `name`. Entries that vanish
    /// during the walk are ignored.
    fn find_by_name(&self, name: &str) -> Vec<Candidate> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && entry.file_name().to_str() == Some(name))
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some(Candidate {
                    depth: entry.depth().saturating_sub(1),
                    path: entry.into_path(),
                    modified,
                })
            })
            .collect()
    }
}

/// Newest candidate; equal timestamps resolve to the shallower copy.
fn newest(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .max_by_key(|c| (c.modified, Reverse(c.depth)))
}

/// Move `from` onto `target`, atomically replacing anything already there.
/// `from` need not sit on the shard chain of its identifier.
fn move_file(from: &Path, target: &ObjectDescriptor) -> io::Result<()> {
    target.ensure_folder()?;
    std::fs::rename(from, target.path())
}
