use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Identifier for a stored object.
///
/// An `ObjectId` is a random (v4) UUID assigned when the object is created. It
/// never changes afterwards and is used verbatim as the object's file name, so
/// the only accepted textual form is the canonical one: lowercase, hyphenated,
/// 36 characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Length of the canonical textual form.
    pub const TEXT_LEN: usize = 36;

    /// Generate a fresh random identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse the canonical textual form.
    ///
    /// Braced, URN, simple (unhyphenated) and uppercase spellings are rejected:
    /// a file whose name is not exactly `id.to_string()` can never be found by
    /// the shard path deriver.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.len() != Self::TEXT_LEN {
            return Err(TypeError::InvalidObjectId(s.to_string()));
        }
        let uuid = Uuid::try_parse(s).map_err(|_| TypeError::InvalidObjectId(s.to_string()))?;
        let id = Self(uuid);
        if id.to_string() != s {
            return Err(TypeError::InvalidObjectId(s.to_string()));
        }
        Ok(id)
    }

    /// Returns `true` if `s` is a canonical identifier.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Short form (first 8 characters), for logs.
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_string()
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
