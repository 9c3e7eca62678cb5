use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use strata_types::ShardDepth;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Source of the live store configuration.
///
/// Components hold a provider rather than a snapshot of its values and query
/// it on every operation, so an operator can change the shard depth (or the
/// maintenance concurrency) without restarting the process.
pub trait ConfigProvider: Send + Sync {
    /// Folder that holds every stored object.
    fn data_root(&self) -> StoreResult<PathBuf>;

    /// The depth new and rebalanced objects are placed at.
    fn shard_depth(&self) -> StoreResult<ShardDepth>;

    /// Worker pool size for maintenance jobs.
    fn maintenance_concurrency(&self) -> usize;
}

/// Static store settings, usually loaded from a TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Folder under which the data and config subfolders live.
    pub root_folder: PathBuf,
    /// Subfolder of `root_folder` holding the shard tree.
    pub data_subfolder: String,
    /// Subfolder of `root_folder` holding the depth control file.
    pub config_subfolder: String,
    /// Name of the depth control file inside the config subfolder.
    pub depth_file_name: String,
    /// Depth used when the control file does not exist.
    pub default_depth: Option<usize>,
    /// Worker pool size for maintenance jobs.
    pub maintenance_concurrency: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            root_folder: PathBuf::from("."),
            data_subfolder: "data".into(),
            config_subfolder: "config".into(),
            depth_file_name: "file-depth".into(),
            default_depth: None,
            maintenance_concurrency: 4,
        }
    }
}

impl StoreSettings {
    /// Settings rooted at `root_folder`, everything else defaulted.
    pub fn with_root(root_folder: impl Into<PathBuf>) -> Self {
        Self {
            root_folder: root_folder.into(),
            ..Default::default()
        }
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Path of the data root (`root_folder/data_subfolder`).
    pub fn data_root(&self) -> StoreResult<PathBuf> {
        let root = self.root_folder()?;
        if self.data_subfolder.is_empty() {
            return Err(StoreError::Config("data subfolder is not configured".into()));
        }
        Ok(root.join(&self.data_subfolder))
    }

    /// Path of the config root (`root_folder/config_subfolder`).
    pub fn config_root(&self) -> StoreResult<PathBuf> {
        let root = self.root_folder()?;
        if self.config_subfolder.is_empty() {
            return Err(StoreError::Config("config subfolder is not configured".into()));
        }
        Ok(root.join(&self.config_subfolder))
    }

    /// Path of the depth control file.
    pub fn depth_file_path(&self) -> StoreResult<PathBuf> {
        if self.depth_file_name.is_empty() {
            return Err(StoreError::Config("depth file name is not configured".into()));
        }
        Ok(self.config_root()?.join(&self.depth_file_name))
    }

    fn root_folder(&self) -> StoreResult<&Path> {
        if self.root_folder.as_os_str().is_empty() {
            return Err(StoreError::Config("root folder is not configured".into()));
        }
        Ok(&self.root_folder)
    }
}

/// Provider backed by [`StoreSettings`] and the depth control file.
///
/// Depth resolution order, re-evaluated on every call:
/// 1. the integer stored in the control file, if the file exists;
/// 2. `default_depth` from the settings;
/// 3. [`ShardDepth::FALLBACK`].
///
/// A control file that exists but does not hold a non-negative integer is a
/// configuration error rather than a reason to fall through.
#[derive(Clone, Debug)]
pub struct FileConfigProvider {
    settings: StoreSettings,
}

impl FileConfigProvider {
    pub fn new(settings: StoreSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Persist `depth` in the control file, creating the config folder.
    ///
    /// Takes effect for the next operation; existing objects keep their
    /// current location until read or rebalanced.
    pub fn set_shard_depth(&self, depth: ShardDepth) -> StoreResult<()> {
        let path = self.settings.depth_file_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{depth}\n"))?;
        debug!(path = %path.display(), %depth, "depth control file written");
        Ok(())
    }

    /// Remove the control file so the static default applies again.
    pub fn clear_shard_depth(&self) -> StoreResult<bool> {
        let path = self.settings.depth_file_path()?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn depth_from_file(&self) -> StoreResult<Option<ShardDepth>> {
        let path = self.settings.depth_file_path()?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Config(format!(
                    "cannot read depth from {}: {e}",
                    path.display()
                )))
            }
        };
        ShardDepth::parse(&text).map(Some).map_err(|e| {
            StoreError::Config(format!("bad depth in {}: {e}", path.display()))
        })
    }
}

impl ConfigProvider for FileConfigProvider {
    fn data_root(&self) -> StoreResult<PathBuf> {
        self.settings.data_root()
    }

    fn shard_depth(&self) -> StoreResult<ShardDepth> {
        Ok(self
            .depth_from_file()?
            .or(self.settings.default_depth.map(ShardDepth::new))
            .unwrap_or(ShardDepth::FALLBACK))
    }

    fn maintenance_concurrency(&self) -> usize {
        self.settings.maintenance_concurrency.max(1)
    }
}

/// In-process provider with a settable depth, for tests and embedding.
#[derive(Debug)]
pub struct StaticConfigProvider {
    data_root: PathBuf,
    depth: AtomicUsize,
    concurrency: AtomicUsize,
}

impl StaticConfigProvider {
    pub fn new(data_root: impl Into<PathBuf>, depth: ShardDepth) -> Self {
        Self {
            data_root: data_root.into(),
            depth: AtomicUsize::new(depth.get()),
            concurrency: AtomicUsize::new(4),
        }
    }

    pub fn set_shard_depth(&self, depth: ShardDepth) {
        self.depth.store(depth.get(), Ordering::SeqCst);
    }

    pub fn set_maintenance_concurrency(&self, workers: usize) {
        self.concurrency.store(workers, Ordering::SeqCst);
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn data_root(&self) -> StoreResult<PathBuf> {
        Ok(self.data_root.clone())
    }

    fn shard_depth(&self) -> StoreResult<ShardDepth> {
        Ok(ShardDepth::new(self.depth.load(Ordering::SeqCst)))
    }

    fn maintenance_concurrency(&self) -> usize {
        self.concurrency.load(Ordering::SeqCst).max(1)
    }
}
