//! Filesystem object storage for Strata.
//!
//! Every object gets a random [`ObjectId`](strata_types::ObjectId) and is
//! stored as a plain file below a chain of single-character shard
//! directories. The number of levels (the shard depth) comes from a
//! [`ConfigProvider`] and may change at any time, so an object can sit at a
//! stale depth until it is read, updated or rebalanced.
//!
//! # Layout
//!
//! ```text
//! data/
//! ├── 0f5e...-...           # depth 0
//! └── q/
//!     └── 3/
//!         └── 7c1a...-...   # depth 2: "q3" = base64url(sha256(id))[..2]
//! ```
//!
//! # Design Rules
//!
//! 1. The shard directories of one identifier form a prefix chain; a missing
//!    directory at depth `d` means no copy exists at any depth `>= d`.
//! 2. The authoritative copy is the most recently modified one.
//! 3. Depth normalization is best effort and never fails a read.
//! 4. Empty shard directories are pruned bottom-up, never past the data root.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod locator;
pub mod prune;
pub mod store;
pub mod traits;

pub use config::{ConfigProvider, FileConfigProvider, StaticConfigProvider, StoreSettings};
pub use descriptor::{derive_path, path_to_descriptor, shard_key, ObjectDescriptor, MAX_SHARD_DEPTH};
pub use error::{StoreError, StoreResult};
pub use locator::ObjectLocator;
pub use prune::{is_dir_empty, prune_empty_ancestors, purge_file};
pub use store::{CopyInfo, FileStore};
pub use traits::ObjectStore;
