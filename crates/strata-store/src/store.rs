use std::sync::Arc;
use std::time::{Instant, SystemTime};

use strata_types::ObjectId;
use tracing::{debug, instrument};

use crate::config::ConfigProvider;
use crate::descriptor::ObjectDescriptor;
use crate::error::{StoreError, StoreResult};
use crate::locator::ObjectLocator;
use crate::prune::purge_file;
use crate::traits::ObjectStore;

/// One on-disk copy of an object, as reported by [`FileStore::locate`].
#[derive(Clone, Debug)]
pub struct CopyInfo {
    pub descriptor: ObjectDescriptor,
    pub modified: SystemTime,
    pub size: u64,
}

/// Filesystem-backed object store with a live-reconfigurable shard depth.
///
/// Writes go to the depth configured at the time of the call. Reads find the
/// authoritative copy wherever it sits and opportunistically move it to the
/// configured depth. No in-process locking is done; concurrent operations on
/// the same identifier race at the filesystem level.
#[derive(Clone)]
pub struct FileStore {
    config: Arc<dyn ConfigProvider>,
    locator: ObjectLocator,
}

impl FileStore {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            locator: ObjectLocator::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    pub fn locator(&self) -> &ObjectLocator {
        &self.locator
    }

    /// Every copy of `id` with its timestamp and size, authoritative first.
    pub fn locate(&self, id: &ObjectId) -> StoreResult<Vec<CopyInfo>> {
        let copies = self.locator.find_all_copies(*id)?;
        if copies.is_empty() {
            return Err(StoreError::NotFound(*id));
        }
        let authoritative = self.locator.pick_authoritative(*id, copies.clone())?;
        let mut infos = Vec::with_capacity(copies.len());
        for descriptor in copies {
            let meta = std::fs::metadata(descriptor.path())?;
            infos.push(CopyInfo {
                modified: meta.modified()?,
                size: meta.len(),
                descriptor,
            });
        }
        infos.sort_by_key(|info| info.descriptor != authoritative);
        Ok(infos)
    }
}

impl ObjectStore for FileStore {
    #[instrument(skip(self, data), fields(len = data.len()), level = "debug")]
    fn create(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let started = Instant::now();
        let descriptor =
            ObjectDescriptor::new_random(self.config.data_root()?, self.config.shard_depth()?)?;
        descriptor.ensure_folder()?;
        descriptor.write(data)?;
        debug!(
            id = %descriptor.id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "object created"
        );
        Ok(descriptor.id())
    }

    #[instrument(skip(self), level = "debug")]
    fn read(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let copies = self.locator.find_all_copies(*id)?;
        if copies.is_empty() {
            return Err(StoreError::NotFound(*id));
        }
        let authoritative = self.locator.pick_authoritative(*id, copies)?;
        let current = self.locator.normalize_depth(authoritative)?;
        Ok(current.read()?)
    }

    #[instrument(skip(self, data), fields(len = data.len()), level = "debug")]
    fn update(&self, id: &ObjectId, data: &[u8]) -> StoreResult<()> {
        let depth = self.config.shard_depth()?;
        let descriptor = ObjectDescriptor::new(self.config.data_root()?, *id, depth)?;
        if !descriptor.file_exists() {
            return Err(StoreError::NotFound(*id));
        }
        descriptor.write(data)?;
        self.locator.clean_up_orphans(&descriptor, depth)?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn delete(&self, id: &ObjectId) -> StoreResult<()> {
        let copies = self.locator.find_all_copies(*id)?;
        if copies.is_empty() {
            return Err(StoreError::NotFound(*id));
        }
        for copy in copies {
            purge_file(copy.root(), &copy.path());
        }
        Ok(())
    }
}
