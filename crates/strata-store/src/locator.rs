use std::cmp::Reverse;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use strata_types::{ObjectId, ShardDepth};
use tracing::{debug, info, warn};

use crate::config::ConfigProvider;
use crate::descriptor::{ObjectDescriptor, MAX_SHARD_DEPTH};
use crate::error::{StoreError, StoreResult};
use crate::prune::purge_file;

/// Finds the on-disk copies of an object across every depth ever used.
///
/// No index is kept: copies are found by probing the prefix chain of shard
/// directories from depth 0 downwards.
#[derive(Clone)]
pub struct ObjectLocator {
    config: Arc<dyn ConfigProvider>,
}

impl ObjectLocator {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    /// Descriptor for `id` at the currently configured depth.
    pub fn canonical(&self, id: ObjectId) -> StoreResult<ObjectDescriptor> {
        ObjectDescriptor::new(self.config.data_root()?, id, self.config.shard_depth()?)
    }

    /// Every existing copy of `id`, ordered by ascending depth.
    ///
    /// Probing stops at the first depth whose shard directory is missing. The
    /// result is empty if the identifier was never written.
    pub fn find_all_copies(&self, id: ObjectId) -> StoreResult<Vec<ObjectDescriptor>> {
        let mut candidate = ObjectDescriptor::new(self.config.data_root()?, id, ShardDepth::ROOT)?;
        let mut copies = Vec::new();
        loop {
            if !candidate.folder_exists() {
                break;
            }
            if candidate.file_exists() {
                copies.push(candidate.clone());
            }
            if candidate.depth().get() == MAX_SHARD_DEPTH {
                break;
            }
            candidate = candidate.to_depth(candidate.depth().deeper())?;
        }
        Ok(copies)
    }

    /// Select the copy with the latest modification time.
    ///
    /// Equal timestamps are resolved in favour of the shallower copy, so the
    /// choice is deterministic even on filesystems with coarse timestamps. A
    /// copy that vanishes while being inspected is ignored.
    pub fn pick_authoritative(
        &self,
        id: ObjectId,
        copies: Vec<ObjectDescriptor>,
    ) -> StoreResult<ObjectDescriptor> {
        let mut stamped: Vec<(SystemTime, ObjectDescriptor)> = Vec::with_capacity(copies.len());
        for copy in copies {
            match copy.modified() {
                Ok(mtime) => stamped.push((mtime, copy)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %copy.path().display(), "copy vanished during inspection");
                }
                Err(e) => return Err(e.into()),
            }
        }
        stamped
            .into_iter()
            .max_by_key(|(mtime, copy)| (*mtime, Reverse(copy.depth())))
            .map(|(_, copy)| copy)
            .ok_or(StoreError::NotFound(id))
    }

    /// Move `copy` to the configured depth if it is anywhere else.
    ///
    /// Best effort: if the move fails, the error is logged and the original,
    /// unmoved descriptor is returned so reads still succeed. If the copy is
    /// gone because a concurrent call already moved it, the target is
    /// returned instead. When the copy
    /// came from a deeper level, the shard directories it leaves empty below
    /// the target are removed.
    pub fn normalize_depth(&self, copy: ObjectDescriptor) -> StoreResult<ObjectDescriptor> {
        let requested = self.config.shard_depth()?;
        debug!(path = %copy.path().display(), "ensuring requested depth");
        if copy.depth() == requested {
            return Ok(copy);
        }

        let target = copy.to_depth(requested)?;
        info!(
            id = %copy.id(),
            from = %copy.depth(),
            to = %requested,
            "object not at requested depth, normalizing"
        );
        if let Err(e) = copy.move_to(&target) {
            if e.kind() == io::ErrorKind::NotFound && target.file_exists() {
                debug!(path = %target.path().display(), "copy already moved by a concurrent read");
                return Ok(target);
            }
            warn!(
                from = %copy.path().display(),
                to = %target.path().display(),
                error = %e,
                "depth normalization failed, keeping original location"
            );
            return Ok(copy);
        }

        if copy.depth() > requested {
            if let Err(e) = prune_below(&target) {
                warn!(path = %target.folder_path().display(), error = %e, "error pruning vacated shard folders");
            }
        }
        Ok(target)
    }

    /// Remove every copy of `keep`'s identifier at any depth other than
    /// `depth_to_keep`.
    ///
    /// Shallower levels (`0..depth_to_keep`) are probed individually; deeper
    /// levels are probed until the prefix chain ends. Returns the number of
    /// copies removed.
    pub fn clean_up_orphans(
        &self,
        keep: &ObjectDescriptor,
        depth_to_keep: ShardDepth,
    ) -> StoreResult<usize> {
        debug!(id = %keep.id(), keep = %depth_to_keep, "cleaning up orphans");
        let root = keep.root().to_path_buf();
        let mut removed = 0;

        for level in 0..depth_to_keep.get() {
            let candidate = keep.to_depth(ShardDepth::new(level))?;
            if candidate.file_exists() && purge_file(&root, &candidate.path()) {
                removed += 1;
            }
        }

        let mut level = depth_to_keep.deeper();
        while level.get() <= MAX_SHARD_DEPTH {
            let candidate = keep.to_depth(level)?;
            if !candidate.folder_exists() {
                break;
            }
            if candidate.file_exists() && purge_file(&root, &candidate.path()) {
                removed += 1;
            }
            level = level.deeper();
        }

        if removed > 0 {
            info!(id = %keep.id(), removed, "removed orphaned copies");
        }
        Ok(removed)
    }
}

/// After a copy was moved up to `target`, delete the now-empty shard
/// directories of the same chain below it, bottom-up, stopping at the first
/// non-empty one.
fn prune_below(target: &ObjectDescriptor) -> StoreResult<()> {
    let deepest = deepest_existing_level(target)?;
    let mut level = deepest;
    while level > target.depth() {
        let folder = target.to_depth(level)?.folder_path();
        if fs::read_dir(&folder)?.next().is_some() {
            return Ok(());
        }
        fs::remove_dir(&folder)?;
        debug!(path = %folder.display(), "deleted empty shard folder");
        level = ShardDepth::new(level.get() - 1);
    }
    Ok(())
}

fn deepest_existing_level(target: &ObjectDescriptor) -> StoreResult<ShardDepth> {
    let mut level = target.depth();
    while level.get() < MAX_SHARD_DEPTH && target.to_depth(level.deeper())?.folder_exists() {
        level = level.deeper();
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigProvider;
    use std::fs::File;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(depth: usize) -> (TempDir, Arc<StaticConfigProvider>, ObjectLocator) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(StaticConfigProvider::new(dir.path(), ShardDepth::new(depth)));
        let locator = ObjectLocator::new(config.clone());
        (dir, config, locator)
    }

    fn place(root: &Path, id: ObjectId, depth: usize, data: &[u8]) -> ObjectDescriptor {
        let d = ObjectDescriptor::new(root, id, ShardDepth::new(depth)).unwrap();
        d.ensure_folder().unwrap();
        d.write(data).unwrap();
        d
    }

    fn set_mtime(d: &ObjectDescriptor, secs_ago: u64) {
        let file = File::options().write(true).open(d.path()).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
            .unwrap();
    }

    #[test]
    fn no_copies_for_unknown_id() {
        let (_dir, _config, locator) = setup(2);
        assert!(locator.find_all_copies(ObjectId::new_random()).unwrap().is_empty());
    }

    #[test]
    fn finds_copies_at_several_depths() {
        let (dir, _config, locator) = setup(2);
        let id = ObjectId::new_random();
        place(dir.path(), id, 0, b"a");
        place(dir.path(), id, 3, b"b");
        let copies = locator.find_all_copies(id).unwrap();
        let depths: Vec<usize> = copies.iter().map(|c| c.depth().get()).collect();
        assert_eq!(depths, vec![0, 3]);
    }

    #[test]
    fn pick_authoritative_prefers_newest() {
        let (dir, _config, locator) = setup(2);
        let id = ObjectId::new_random();
        let old = place(dir.path(), id, 1, b"old");
        let new = place(dir.path(), id, 3, b"new");
        set_mtime(&old, 100);
        set_mtime(&new, 10);
        let copies = locator.find_all_copies(id).unwrap();
        let winner = locator.pick_authoritative(id, copies).unwrap();
        assert_eq!(winner, new);
    }

    #[test]
    fn pick_authoritative_breaks_ties_by_shallower_depth() {
        let (dir, _config, locator) = setup(2);
        let id = ObjectId::new_random();
        let a = place(dir.path(), id, 1, b"a");
        let b = place(dir.path(), id, 2, b"b");
        let stamp = SystemTime::now() - Duration::from_secs(50);
        for d in [&a, &b] {
            File::options().write(true).open(d.path()).unwrap().set_modified(stamp).unwrap();
        }
        let winner = locator.pick_authoritative(id, vec![b.clone(), a.clone()]).unwrap();
        assert_eq!(winner, a);
    }

    #[test]
    fn pick_authoritative_of_nothing_is_not_found() {
        let (_dir, _config, locator) = setup(2);
        let id = ObjectId::new_random();
        let err = locator.pick_authoritative(id, Vec::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn normalize_is_noop_at_requested_depth() {
        let (dir, _config, locator) = setup(2);
        let d = place(dir.path(), ObjectId::new_random(), 2, b"x");
        let before = d.modified().unwrap();
        let once = locator.normalize_depth(d.clone()).unwrap();
        let twice = locator.normalize_depth(once.clone()).unwrap();
        assert_eq!(once, d);
        assert_eq!(twice, d);
        assert_eq!(d.modified().unwrap(), before);
        assert_eq!(d.read().unwrap(), b"x");
    }

    #[test]
    fn normalize_moves_shallow_copy_down() {
        let (dir, _config, locator) = setup(3);
        let id = ObjectId::new_random();
        let shallow = place(dir.path(), id, 1, b"data");
        let moved = locator.normalize_depth(shallow.clone()).unwrap();
        assert_eq!(moved.depth(), ShardDepth::new(3));
        assert_eq!(moved.read().unwrap(), b"data");
        assert!(!shallow.file_exists());
    }

    #[test]
    fn normalize_moves_deep_copy_up_and_prunes() {
        let (dir, _config, locator) = setup(1);
        let id = ObjectId::new_random();
        let deep = place(dir.path(), id, 4, b"data");
        let moved = locator.normalize_depth(deep.clone()).unwrap();
        assert_eq!(moved.depth(), ShardDepth::new(1));
        assert_eq!(moved.read().unwrap(), b"data");
        assert!(!moved.to_depth(ShardDepth::new(2)).unwrap().folder_exists());
        assert!(moved.folder_exists());
    }

    #[test]
    fn normalize_replaces_existing_target() {
        let (dir, _config, locator) = setup(2);
        let id = ObjectId::new_random();
        place(dir.path(), id, 2, b"stale");
        let newer = place(dir.path(), id, 0, b"fresh");
        let moved = locator.normalize_depth(newer).unwrap();
        assert_eq!(moved.read().unwrap(), b"fresh");
        assert_eq!(locator.find_all_copies(id).unwrap().len(), 1);
    }

    #[test]
    fn normalize_keeps_original_when_move_fails() {
        let (dir, _config, locator) = setup(2);
        let id = ObjectId::new_random();
        let shallow = place(dir.path(), id, 0, b"data");
        // A regular file where the first shard directory must go blocks the move.
        let target = shallow.to_depth(ShardDepth::new(2)).unwrap();
        let first_level = target.to_depth(ShardDepth::new(1)).unwrap().folder_path();
        fs::write(&first_level, b"blocker").unwrap();

        let result = locator.normalize_depth(shallow.clone()).unwrap();
        assert_eq!(result, shallow);
        assert_eq!(result.read().unwrap(), b"data");
    }

    #[test]
    fn normalize_after_concurrent_move_returns_target() {
        let (dir, _config, locator) = setup(1);
        let id = ObjectId::new_random();
        let deep = place(dir.path(), id, 3, b"data");
        let first = locator.normalize_depth(deep.clone()).unwrap();
        let second = locator.normalize_depth(deep).unwrap();
        assert_eq!(second, first);
        assert_eq!(second.read().unwrap(), b"data");
        assert_eq!(locator.find_all_copies(id).unwrap(), vec![first]);
    }

    #[test]
    fn concurrent_reads_never_lose_a_drifted_object() {
        use crate::store::FileStore;
        use crate::traits::ObjectStore;

        let (_dir, config, locator) = setup(3);
        let store = Arc::new(FileStore::new(config.clone()));
        for _ in 0..100 {
            config.set_shard_depth(ShardDepth::new(3));
            let id = store.create(b"shared").unwrap();
            config.set_shard_depth(ShardDepth::new(1));

            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    std::thread::spawn(move || store.read(&id))
                })
                .collect();
            for reader in readers {
                let _ = reader.join().unwrap();
            }

            let copies = locator.find_all_copies(id).unwrap();
            assert_eq!(copies.len(), 1, "{id} must keep exactly one copy");
            assert_eq!(copies[0].read().unwrap(), b"shared");
            assert_eq!(store.read(&id).unwrap(), b"shared");
        }
    }

    #[test]
    fn orphan_cleanup_leaves_single_copy() {
        let (dir, _config, locator) = setup(2);
        let id = ObjectId::new_random();
        place(dir.path(), id, 0, b"a");
        place(dir.path(), id, 1, b"b");
        let keep = place(dir.path(), id, 2, b"c");
        place(dir.path(), id, 4, b"d");
        let removed = locator.clean_up_orphans(&keep, ShardDepth::new(2)).unwrap();
        assert_eq!(removed, 3);
        let copies = locator.find_all_copies(id).unwrap();
        assert_eq!(copies, vec![keep.clone()]);
        assert!(!keep.to_depth(ShardDepth::new(3)).unwrap().folder_exists());
    }

    #[test]
    fn canonical_follows_live_depth() {
        let (_dir, config, locator) = setup(2);
        let id = ObjectId::new_random();
        assert_eq!(locator.canonical(id).unwrap().depth(), ShardDepth::new(2));
        config.set_shard_depth(ShardDepth::new(5));
        assert_eq!(locator.canonical(id).unwrap().depth(), ShardDepth::new(5));
    }
}
