use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use strata_types::{ObjectId, ShardDepth};

use crate::error::{StoreError, StoreResult};

/// Length of the base64url (unpadded) encoding of a SHA-256 digest. Each
/// character names one shard level, so this is the deepest usable depth.
pub const MAX_SHARD_DEPTH: usize = 43;

/// The shard characters for `id`: base64url(SHA-256(id text)), unpadded.
pub fn shard_key(id: &ObjectId) -> String {
    let digest = Sha256::digest(id.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Where one object lives (or would live) at one depth.
///
/// The path is `root/c1/.../cd/<id>` where `c1..cd` are the first `d`
/// characters of [`shard_key`]. Since the key is fixed per identifier, the
/// shard directory for depth `d + 1` always sits directly inside the one for
/// depth `d`: the directories for one identifier form a prefix chain. If the
/// directory at some depth is missing, no deeper copy can exist.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectDescriptor {
    root: PathBuf,
    id: ObjectId,
    depth: ShardDepth,
    shard_key: String,
}

impl ObjectDescriptor {
    /// Derive the descriptor for `id` at `depth` under `root`.
    ///
    /// Fails with `InvalidArgument` if `depth` exceeds [`MAX_SHARD_DEPTH`].
    pub fn new(root: impl Into<PathBuf>, id: ObjectId, depth: ShardDepth) -> StoreResult<Self> {
        check_depth(depth)?;
        Ok(Self {
            root: root.into(),
            shard_key: shard_key(&id),
            id,
            depth,
        })
    }

    /// A descriptor for a freshly generated identifier.
    pub fn new_random(root: impl Into<PathBuf>, depth: ShardDepth) -> StoreResult<Self> {
        Self::new(root, ObjectId::new_random(), depth)
    }

    /// Inverse mapping: recover identifier and depth from an on-disk path.
    ///
    /// The depth is the number of directories between `root` and the file.
    /// The shard directory names themselves are not checked, so a file that
    /// was dropped into the wrong directory still yields its identifier and
    /// the depth implied by its position.
    pub fn from_path(root: impl Into<PathBuf>, path: &Path) -> StoreResult<Self> {
        let root = root.into();
        let (id, depth) = path_to_descriptor(&root, path)?;
        Self::new(root, id, depth)
    }

    /// Same identifier and root, different depth.
    pub fn to_depth(&self, depth: ShardDepth) -> StoreResult<Self> {
        check_depth(depth)?;
        Ok(Self {
            root: self.root.clone(),
            id: self.id,
            depth,
            shard_key: self.shard_key.clone(),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn depth(&self) -> ShardDepth {
        self.depth
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shard directory names from the root downwards.
    pub fn shard_components(&self) -> impl Iterator<Item = char> + '_ {
        self.shard_key.chars().take(self.depth.get())
    }

    /// Directory holding the object file at this depth.
    pub fn folder_path(&self) -> PathBuf {
        let mut path = self.root.clone();
        let mut buf = [0u8; 4];
        for c in self.shard_components() {
            path.push(c.encode_utf8(&mut buf));
        }
        path
    }

    /// Full path of the object file at this depth.
    pub fn path(&self) -> PathBuf {
        self.folder_path().join(self.id.to_string())
    }

    /// Returns `true` if the object file exists at this depth.
    pub fn file_exists(&self) -> bool {
        self.path().is_file()
    }

    /// Returns `true` if the shard directory for this depth exists.
    pub fn folder_exists(&self) -> bool {
        self.folder_path().is_dir()
    }

    /// Last modification time of the object file.
    pub fn modified(&self) -> io::Result<SystemTime> {
        fs::metadata(self.path())?.modified()
    }

    /// Create the shard directory chain for this depth.
    pub fn ensure_folder(&self) -> io::Result<()> {
        fs::create_dir_all(self.folder_path())
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(self.path())
    }

    /// Write `data` to the object file, replacing any previous content.
    pub fn write(&self, data: &[u8]) -> io::Result<()> {
        fs::write(self.path(), data)
    }

    /// Move this object file onto `target`, replacing whatever occupies it.
    ///
    /// The replacement is a single `rename`: the target is never left empty,
    /// and it is not touched at all if this file has already gone.
    pub fn move_to(&self, target: &ObjectDescriptor) -> io::Result<()> {
        target.ensure_folder()?;
        fs::rename(self.path(), target.path())
    }
}

/// `derivePath`: the object file path for `id` at `depth` under `root`.
pub fn derive_path(root: &Path, id: &ObjectId, depth: ShardDepth) -> StoreResult<PathBuf> {
    Ok(ObjectDescriptor::new(root, *id, depth)?.path())
}

/// `pathToDescriptor`: identifier and implied depth of a file under `root`.
///
/// Fails with `InvalidArgument` if `path` is not strictly below `root`, has a
/// non-normal component, or its file name is not a canonical identifier.
pub fn path_to_descriptor(root: &Path, path: &Path) -> StoreResult<(ObjectId, ShardDepth)> {
    let relative = path.strip_prefix(root).map_err(|_| {
        StoreError::InvalidArgument(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;

    let mut components = 0usize;
    for component in relative.components() {
        match component {
            Component::Normal(_) => components += 1,
            _ => {
                return Err(StoreError::InvalidArgument(format!(
                    "unexpected component in {}",
                    path.display()
                )))
            }
        }
    }
    if components == 0 {
        return Err(StoreError::InvalidArgument(format!(
            "{} names the store root, not an object",
            path.display()
        )));
    }

    let name = relative
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::InvalidArgument(format!("no file name in {}", path.display())))?;
    let id = ObjectId::parse(name)?;
    Ok((id, ShardDepth::new(components - 1)))
}

fn check_depth(depth: ShardDepth) -> StoreResult<()> {
    if depth.get() > MAX_SHARD_DEPTH {
        return Err(StoreError::InvalidArgument(format!(
            "shard depth {depth} exceeds maximum {MAX_SHARD_DEPTH}"
        )));
    }
    Ok(())
}
