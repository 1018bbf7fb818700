//! Node and archive records held in the persisted tables.
//!
//! A [`NodeRecord`] lives in the active state table for as long as the node
//! keeps appearing in snapshots. Once it is swept as dropped it is converted
//! into an [`ArchiveRecord`] and moves to the graveyard table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a mesh node (usually the primary MAC without colons).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Presence state of one node in the active table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRecord {
    /// Last reported hostname. Empty until the node is first folded.
    pub hostname: String,

    /// Debounced presence flag.
    pub online: bool,

    /// Seen in the snapshot of the current run.
    ///
    /// Only meaningful between the mark and sweep phases of one run; never
    /// persisted.
    #[serde(skip)]
    pub available: bool,

    pub firstseen: DateTime<Utc>,
    pub lastseen: DateTime<Utc>,
}

impl NodeRecord {
    /// A record for a node that has never been folded: offline, no hostname.
    #[must_use]
    pub const fn unseen(firstseen: DateTime<Utc>, lastseen: DateTime<Utc>) -> Self {
        Self {
            hostname: String::new(),
            online: false,
            available: false,
            firstseen,
            lastseen,
        }
    }
}

/// A dropped node as kept in the graveyard table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveRecord {
    pub id: NodeId,
    pub hostname: String,
    pub firstseen: DateTime<Utc>,
    pub lastseen: DateTime<Utc>,
}

impl ArchiveRecord {
    #[must_use]
    pub fn from_node(id: NodeId, node: &NodeRecord) -> Self {
        Self {
            id,
            hostname: node.hostname.clone(),
            firstseen: node.firstseen,
            lastseen: node.lastseen,
        }
    }
}
