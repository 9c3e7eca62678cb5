use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Returns `true` if `dir` has no entries.
pub fn is_dir_empty(dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Delete `start` and each of its ancestors while they are empty, stopping at
/// the first non-empty directory or at `root` (which is never removed).
///
/// Returns the number of directories removed. A directory that disappears or
/// gains an entry between the emptiness check and the delete ends the ascent
/// without an error, since another writer or pruner got there first.
pub fn prune_empty_ancestors(root: &Path, start: &Path) -> StoreResult<usize> {
    if !start.starts_with(root) {
        return Err(StoreError::InvalidArgument(format!(
            "{} is not under the store root {}",
            start.display(),
            root.display()
        )));
    }

    let mut removed = 0;
    let mut current: PathBuf = start.to_path_buf();
    while current != root {
        match is_dir_empty(&current) {
            Ok(true) => {}
            Ok(false) => {
                debug!(path = %current.display(), "folder not empty, pruning stops");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        match fs::remove_dir(&current) {
            Ok(()) => {
                debug!(path = %current.display(), "deleted empty folder");
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                if current.is_dir() && !is_dir_empty(&current).unwrap_or(false) {
                    debug!(path = %current.display(), "folder filled concurrently, pruning stops");
                    break;
                }
                return Err(e.into());
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    Ok(removed)
}

/// Delete one file and prune the directories it leaves empty.
///
/// Failures are logged and swallowed: purging one stale copy must not stop
/// the caller from purging the next. Returns `true` if the file was removed.
pub fn purge_file(root: &Path, file: &Path) -> bool {
    debug!(path = %file.display(), "deleting file");
    if let Err(e) = fs::remove_file(file) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %file.display(), error = %e, "error deleting file");
        }
        return false;
    }
    if let Some(folder) = file.parent() {
        if let Err(e) = prune_empty_ancestors(root, folder) {
            warn!(path = %folder.display(), error = %e, "error pruning empty folders");
        }
    }
    true
}
