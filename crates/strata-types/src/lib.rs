//! Foundation types for the Strata object store.
//!
//! Every other Strata crate depends on `strata-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: random 128-bit identifier naming one stored object
//! - [`ShardDepth`]: number of hash-derived directory levels above an object

pub mod depth;
pub mod error;
pub mod object;

pub use depth::ShardDepth;
pub use error::TypeError;
pub use object::ObjectId;
