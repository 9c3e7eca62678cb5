use strata_types::ObjectId;

use crate::error::StoreResult;

/// Blob store keyed by random identifiers.
///
/// Implementations must satisfy these invariants:
/// - `create` always assigns a fresh identifier; existing objects are never
///   overwritten by it.
/// - `read`, `update` and `delete` fail with `NotFound` when no copy exists.
/// - Operations on different identifiers never contend with each other.
/// - Operations on the same identifier are not mutually excluded.
pub trait ObjectStore: Send + Sync {
    /// Store `data` under a new identifier and return it.
    fn create(&self, data: &[u8]) -> StoreResult<ObjectId>;

    /// Read the authoritative content of an object.
    fn read(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    /// Replace the content of an object that exists at the configured depth.
    fn update(&self, id: &ObjectId, data: &[u8]) -> StoreResult<()>;

    /// Remove every copy of an object.
    fn delete(&self, id: &ObjectId) -> StoreResult<()>;
}
