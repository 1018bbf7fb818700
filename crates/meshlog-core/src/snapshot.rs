//! Parsing of the meshviewer `nodes.json` roster.
//!
//! The roster is produced by an external collector, so unknown fields are
//! ignored. The fields the state machine needs are mandatory: a single entry
//! without them aborts the whole run rather than producing a partially
//! applied state table.
//!
//! ```text
//! {"nodes": [{"firstseen": "...", "lastseen": "...",
//!             "flags": {"online": true},
//!             "nodeinfo": {"node_id": "...", "hostname": "..."}}]}
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::ErrorCode;
use crate::model::NodeId;

/// Errors raised while reading or validating a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("snapshot is not valid roster JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("node #{index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("node #{index}: empty node id")]
    EmptyNodeId { index: usize },

    #[error("node #{index}: cannot parse `{field}` timestamp {value:?}")]
    InvalidTimestamp {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("node id {id} appears more than once")]
    DuplicateNodeId { id: NodeId },
}

impl SnapshotError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::SnapshotUnreadable,
            Self::DuplicateNodeId { .. } => ErrorCode::DuplicateNodeId,
            Self::Json(_)
            | Self::MissingField { .. }
            | Self::EmptyNodeId { .. }
            | Self::InvalidTimestamp { .. } => ErrorCode::SnapshotMalformed,
        }
    }
}

/// One validated roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    pub id: NodeId,
    pub hostname: String,
    /// Raw online flag as reported by the collector (not debounced).
    pub online: bool,
    pub firstseen: DateTime<Utc>,
    pub lastseen: DateTime<Utc>,
}

/// A complete, validated roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub nodes: Vec<SnapshotNode>,
}

#[derive(Deserialize)]
struct RawRoster {
    nodes: Vec<RawNode>,
}

#[derive(Deserialize)]
struct RawNode {
    firstseen: Option<String>,
    lastseen: Option<String>,
    flags: Option<RawFlags>,
    nodeinfo: Option<RawNodeInfo>,
}

#[derive(Deserialize)]
struct RawFlags {
    online: Option<bool>,
}

#[derive(Deserialize)]
struct RawNodeInfo {
    node_id: Option<String>,
    hostname: Option<String>,
}

impl Snapshot {
    /// Read and validate a roster file.
    pub fn read(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a roster document.
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        let raw: RawRoster = serde_json::from_str(json)?;
        let mut seen = HashSet::with_capacity(raw.nodes.len());
        let mut nodes = Vec::with_capacity(raw.nodes.len());

        for (index, entry) in raw.nodes.into_iter().enumerate() {
            let node = validate(index, entry)?;
            if !seen.insert(node.id.clone()) {
                return Err(SnapshotError::DuplicateNodeId { id: node.id });
            }
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn validate(index: usize, entry: RawNode) -> Result<SnapshotNode, SnapshotError> {
    let missing = |field| SnapshotError::MissingField { index, field };

    let info = entry.nodeinfo.ok_or_else(|| missing("nodeinfo"))?;
    let id = info.node_id.ok_or_else(|| missing("nodeinfo.node_id"))?;
    if id.trim().is_empty() {
        return Err(SnapshotError::EmptyNodeId { index });
    }
    let hostname = info.hostname.ok_or_else(|| missing("nodeinfo.hostname"))?;
    let online = entry
        .flags
        .and_then(|flags| flags.online)
        .ok_or_else(|| missing("flags.online"))?;

    let firstseen_raw = entry.firstseen.ok_or_else(|| missing("firstseen"))?;
    let lastseen_raw = entry.lastseen.ok_or_else(|| missing("lastseen"))?;
    let firstseen =
        parse_timestamp(&firstseen_raw).ok_or_else(|| SnapshotError::InvalidTimestamp {
            index,
            field: "firstseen",
            value: firstseen_raw.clone(),
        })?;
    let lastseen =
        parse_timestamp(&lastseen_raw).ok_or_else(|| SnapshotError::InvalidTimestamp {
            index,
            field: "lastseen",
            value: lastseen_raw.clone(),
        })?;

    Ok(SnapshotNode {
        id: NodeId::new(id),
        hostname,
        online,
        firstseen,
        lastseen,
    })
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a collector timestamp.
///
/// Accepts RFC 3339, ISO 8601 with a colon-less numeric offset, and
/// offset-less ISO 8601, which is taken to be UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: &str, host: &str, online: bool) -> String {
        format!(
            r#"{{"firstseen":"2024-03-01T10:00:00","lastseen":"2024-03-15T10:00:00",
                "flags":{{"online":{online},"gateway":false}},
                "nodeinfo":{{"node_id":"{id}","hostname":"{host}","hardware":{{"model":"x"}}}}}}"#
        )
    }

    #[test]
    fn parses_meshviewer_roster_and_ignores_extra_fields() {
        let json = format!(
            r#"{{"version":2,"timestamp":"2024-03-15T10:00:00","nodes":[{},{}]}}"#,
            entry("aa01", "ffv-a", true),
            entry("bb02", "ffv-b", false)
        );
        let snap = Snapshot::from_json_str(&json).expect("valid roster");
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.nodes[0].id.as_str(), "aa01");
        assert_eq!(snap.nodes[0].hostname, "ffv-a");
        assert!(snap.nodes[0].online);
        assert!(!snap.nodes[1].online);
        assert_eq!(
            snap.nodes[1].lastseen,
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_identity_is_fatal_and_names_the_entry() {
        let json = format!(
            r#"{{"nodes":[{},{{"firstseen":"2024-03-01T10:00:00","lastseen":"2024-03-01T10:00:00",
                "flags":{{"online":true}},"nodeinfo":{{"hostname":"anon"}}}}]}}"#,
            entry("aa01", "ffv-a", true)
        );
        let err = Snapshot::from_json_str(&json).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::MissingField {
                index: 1,
                field: "nodeinfo.node_id"
            }
        ));
        assert_eq!(err.code(), ErrorCode::SnapshotMalformed);
    }

    #[test]
    fn missing_online_flag_is_fatal() {
        let json = r#"{"nodes":[{"firstseen":"2024-03-01T10:00:00","lastseen":"2024-03-01T10:00:00",
            "flags":{},"nodeinfo":{"node_id":"x","hostname":"y"}}]}"#;
        let err = Snapshot::from_json_str(json).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingField { field: "flags.online", .. }));
    }

    #[test]
    fn empty_node_id_is_fatal() {
        let json = format!(r#"{{"nodes":[{}]}}"#, entry("  ", "ffv-a", true));
        assert!(matches!(
            Snapshot::from_json_str(&json),
            Err(SnapshotError::EmptyNodeId { index: 0 })
        ));
    }

    #[test]
    fn duplicate_node_id_is_fatal() {
        let json = format!(
            r#"{{"nodes":[{},{}]}}"#,
            entry("aa01", "ffv-a", true),
            entry("aa01", "ffv-b", true)
        );
        let err = Snapshot::from_json_str(&json).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateNodeId);
    }

    #[test]
    fn garbage_is_a_json_error() {
        let err = Snapshot::from_json_str("{\"nodes\": 5}").unwrap_err();
        assert!(matches!(err, SnapshotError::Json(_)));
    }

    #[test]
    fn bad_timestamp_is_reported() {
        let json = r#"{"nodes":[{"firstseen":"yesterday","lastseen":"2024-03-01T10:00:00",
            "flags":{"online":true},"nodeinfo":{"node_id":"x","hostname":"y"}}]}"#;
        let err = Snapshot::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidTimestamp { field: "firstseen", .. }
        ));
    }

    #[test]
    fn timestamp_variants_agree() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        for raw in [
            "2024-03-15T10:00:00Z",
            "2024-03-15T12:00:00+02:00",
            "2024-03-15T12:00:00+0200",
            "2024-03-15T10:00:00",
            "2024-03-15T10:00:00.000",
            "2024-03-15 10:00:00",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_timestamp("15.03.2024"), None);
    }
}
