use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of single-character shard directories between the store root and an
/// object file.
///
/// Depth is a property of the store configuration, not of an object: the same
/// object may sit at a stale depth on disk until it is rebalanced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardDepth(usize);

impl ShardDepth {
    /// Depth used when neither the control file nor the static configuration
    /// provides one.
    pub const FALLBACK: Self = Self(4);

    /// Objects stored directly in the store root.
    pub const ROOT: Self = Self(0);

    pub const fn new(levels: usize) -> Self {
        Self(levels)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    /// The next deeper level.
    pub const fn deeper(self) -> Self {
        Self(self.0 + 1)
    }

    /// Parse a depth from operator-supplied text, e.g. the depth control file.
    ///
    /// Surrounding whitespace is ignored. Negative or non-numeric values are
    /// rejected.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.trim();
        trimmed
            .parse::<usize>()
            .map(Self)
            .map_err(|_| TypeError::InvalidDepth(trimmed.to_string()))
    }
}

impl fmt::Display for ShardDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShardDepth {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<usize> for ShardDepth {
    fn from(levels: usize) -> Self {
        Self(levels)
    }
}

impl From<ShardDepth> for usize {
    fn from(depth: ShardDepth) -> Self {
        depth.0
    }
}
