use std::fmt;

/// Machine-readable error codes for operators and schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidConfigValue,
    SnapshotUnreadable,
    SnapshotMalformed,
    DuplicateNodeId,
    StoreUnreadable,
    StoreCorrupt,
    UnsupportedSchemaVersion,
    StoreWriteFailed,
    LockContention,
    ReportWriteFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidConfigValue => "E1002",
            Self::SnapshotUnreadable => "E2001",
            Self::SnapshotMalformed => "E2002",
            Self::DuplicateNodeId => "E2003",
            Self::StoreCorrupt => "E3001",
            Self::StoreUnreadable => "E3003",
            Self::UnsupportedSchemaVersion => "E3002",
            Self::StoreWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::ReportWriteFailed => "E5003",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidConfigValue => "Invalid configuration value",
            Self::SnapshotUnreadable => "Node snapshot unreadable",
            Self::SnapshotMalformed => "Node snapshot malformed",
            Self::DuplicateNodeId => "Duplicate node id in snapshot",
            Self::StoreUnreadable => "Persisted table unreadable",
            Self::StoreCorrupt => "Persisted table is corrupt",
            Self::UnsupportedSchemaVersion => "Unsupported schema version",
            Self::StoreWriteFailed => "Persisted table write failed",
            Self::LockContention => "Lock contention",
            Self::ReportWriteFailed => "Output document write failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in meshlog.toml and retry."),
            Self::InvalidConfigValue => {
                Some("Numeric overrides must be non-negative integers.")
            }
            Self::SnapshotUnreadable => Some("Check the snapshot path and permissions."),
            Self::SnapshotMalformed => {
                Some("Every node needs nodeinfo.node_id, nodeinfo.hostname, flags.online, firstseen and lastseen.")
            }
            Self::DuplicateNodeId => Some("Fix the snapshot producer; node ids must be unique."),
            Self::StoreUnreadable => {
                Some("Check permissions on the database directory; the table is left as is.")
            }
            Self::StoreCorrupt => {
                Some("Restore the file from backup or remove it to start with an empty table.")
            }
            Self::UnsupportedSchemaVersion => {
                Some("Upgrade meshlog to a version that understands this table.")
            }
            Self::StoreWriteFailed | Self::ReportWriteFailed => {
                Some("Check disk space and write permissions.")
            }
            Self::LockContention => {
                Some("Another run holds the database lock; retry after it finishes.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
