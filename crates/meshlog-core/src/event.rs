//! Node lifecycle events.
//!
//! An [`EventRecord`] is immutable once created. Its timestamp may be
//! backdated relative to the run that produced it: a `new` event carries the
//! node's first-seen time, an `offline` event the node's last-seen time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The five lifecycle transitions recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// First sighting of a node whose first-seen time is recent.
    New,
    /// Accepted transition into online.
    Online,
    /// Accepted transition into offline (after the grace period).
    Offline,
    /// Hostname changed from a non-empty value.
    Rename,
    /// Node vanished from the snapshot and was moved to the graveyard.
    Drop,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind '{}': expected one of new, online, offline, rename, drop",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::Online,
        Self::Offline,
        Self::Rename,
        Self::Drop,
    ];

    /// Return the canonical lower-case representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Rename => "rename",
            Self::Drop => "drop",
        }
    }

    /// Upper-case label used in feed titles (`[OFFLINE] ...`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Rename => "RENAME",
            Self::Drop => "DROP",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "rename" => Ok(Self::Rename),
            "drop" => Ok(Self::Drop),
            _ => Err(UnknownEventKind { raw: s.to_string() }),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A single entry in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    /// Hostname, or `"old -> new"` for renames.
    pub message: String,
    /// Deep link to the node on the map view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Unique id, used for stable feed entry ids.
    pub id: Uuid,
}

impl EventRecord {
    /// Create an event with a fresh random id.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        kind: EventKind,
        message: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            kind,
            message: message.into(),
            url,
            id: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn display_fromstr_roundtrip() {
        for kind in EventKind::ALL {
            let reparsed: EventKind = kind.to_string().parse().expect("should roundtrip");
            assert_eq!(kind, reparsed);
        }
    }

    #[test]
    fn label_is_upper_case_of_name() {
        for kind in EventKind::ALL {
            assert_eq!(kind.label(), kind.as_str().to_uppercase());
        }
    }

    #[test]
    fn fromstr_rejects_unknown() {
        let err = "RENAME".parse::<EventKind>().unwrap_err();
        assert_eq!(err.raw, "RENAME");
        assert!(err.to_string().contains("expected one of"));
    }

    #[test]
    fn serde_uses_lower_case_names() {
        let json = serde_json::to_string(&EventKind::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
        assert!(serde_json::from_str::<EventKind>("\"vanish\"").is_err());
    }

    #[test]
    fn events_get_distinct_ids() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let a = EventRecord::new(ts, EventKind::New, "ffv-a", None);
        let b = EventRecord::new(ts, EventKind::New, "ffv-a", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn missing_url_is_omitted_from_json() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let event = EventRecord::new(ts, EventKind::Drop, "ffv-a", None);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("url"));
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
