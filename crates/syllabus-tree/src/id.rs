//! Identifiers for nodes of the course tree.
//!
//! Nodes created in the editor get a local temporary id until the backend
//! assigns a real one during a deep upsert. Server ids are UUIDs; local ids
//! are rendered as `tmp_<uuid>` on the wire and in logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix used when rendering local ids.
pub const LOCAL_ID_PREFIX: &str = "tmp_";

/// Identifier of a node in the course tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// Id assigned by the backend.
    Server(Uuid),
    /// Temporary id assigned locally, not yet known to the backend.
    Local(Uuid),
}

impl EntityId {
    /// Creates a fresh local id.
    #[must_use]
    pub fn local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    /// Returns `true` if the backend does not know this node yet.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns the server UUID, or `None` for local ids.
    #[must_use]
    pub const fn server_id(&self) -> Option<Uuid> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self::Server(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Local(id) => write!(f, "{LOCAL_ID_PREFIX}{id}"),
        }
    }
}

/// Error returned when parsing an [`EntityId`] fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity id '{0}': expected a UUID or 'tmp_<uuid>'")]
pub struct ParseEntityIdError(String);

impl FromStr for EntityId {
    type Err = ParseEntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(LOCAL_ID_PREFIX) {
            return Uuid::parse_str(rest)
                .map(Self::Local)
                .map_err(|_| ParseEntityIdError(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self::Server)
            .map_err(|_| ParseEntityIdError(s.to_string()))
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
