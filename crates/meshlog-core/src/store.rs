//! Persistence of the state table, event log and archive table.
//!
//! # Layout
//!
//! ```text
//! <db_dir>/
//!   state.json       # {"version": 1, "nodes": {<id>: NodeRecord}}
//!   eventlog.json    # {"version": 1, "events": [EventRecord]}
//!   graveyard.json   # {"version": 1, "nodes": {<id>: ArchiveRecord}}
//!   meshlog.toml     # optional configuration
//!   lock             # advisory run lock
//! ```
//!
//! # Invariants
//!
//! - A missing table loads as empty; a present but unreadable one is fatal.
//! - Documents carry an explicit schema version; unknown versions and
//!   unknown fields are rejected rather than merged.
//! - Writes go to `<file>.tmp`, are flushed and synced, and only then
//!   renamed over the target, so readers never see a partial document.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ErrorCode;
use crate::event::EventRecord;
use crate::eventlog::EventLog;
use crate::graveyard::ArchiveTable;
use crate::presence::StateTable;

pub const STATE_FILE: &str = "state.json";
pub const EVENTLOG_FILE: &str = "eventlog.json";
pub const GRAVEYARD_FILE: &str = "graveyard.json";
pub const LOCK_FILE: &str = "lock";

/// Schema version written into every persisted document.
pub const SCHEMA_VERSION: u64 = 1;

/// Errors raised while loading or persisting tables and output documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("corrupt document {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{path}: unsupported schema version {found:?}")]
    UnsupportedVersion { path: PathBuf, found: Option<u64> },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to write output {path}: {source}")]
    OutputWrite { path: PathBuf, source: io::Error },
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::StoreUnreadable,
            Self::Corrupt { .. } => ErrorCode::StoreCorrupt,
            Self::UnsupportedVersion { .. } => ErrorCode::UnsupportedSchemaVersion,
            Self::Serialize { .. } | Self::Write { .. } => ErrorCode::StoreWriteFailed,
            Self::OutputWrite { .. } => ErrorCode::ReportWriteFailed,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StateDoc {
    #[allow(dead_code)]
    version: u64,
    nodes: StateTable,
}

#[derive(Serialize)]
struct StateDocRef<'a> {
    version: u64,
    nodes: &'a StateTable,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EventLogDoc {
    #[allow(dead_code)]
    version: u64,
    events: Vec<EventRecord>,
}

#[derive(Serialize)]
struct EventLogDocRef<'a> {
    version: u64,
    events: &'a [EventRecord],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchiveDoc {
    #[allow(dead_code)]
    version: u64,
    nodes: ArchiveTable,
}

#[derive(Serialize)]
struct ArchiveDocRef<'a> {
    version: u64,
    nodes: &'a ArchiveTable,
}

/// Handle on a database directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (and create if needed) the database directory.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn load_state(&self) -> Result<StateTable, StoreError> {
        let path = self.dir.join(STATE_FILE);
        let doc: Option<StateDoc> = read_versioned(&path)?;
        Ok(doc.map(|doc| doc.nodes).unwrap_or_default())
    }

    pub fn load_event_log(&self) -> Result<EventLog, StoreError> {
        let path = self.dir.join(EVENTLOG_FILE);
        let doc: Option<EventLogDoc> = read_versioned(&path)?;
        Ok(EventLog::from_events(
            doc.map(|doc| doc.events).unwrap_or_default(),
        ))
    }

    pub fn load_archive(&self) -> Result<ArchiveTable, StoreError> {
        let path = self.dir.join(GRAVEYARD_FILE);
        let doc: Option<ArchiveDoc> = read_versioned(&path)?;
        Ok(doc.map(|doc| doc.nodes).unwrap_or_default())
    }

    pub fn stage_state(&self, state: &StateTable) -> Result<StagedWrite, StoreError> {
        let doc = StateDocRef {
            version: SCHEMA_VERSION,
            nodes: state,
        };
        stage_json(&self.dir.join(STATE_FILE), &doc)
    }

    pub fn stage_event_log(&self, log: &EventLog) -> Result<StagedWrite, StoreError> {
        let doc = EventLogDocRef {
            version: SCHEMA_VERSION,
            events: log.events(),
        };
        stage_json(&self.dir.join(EVENTLOG_FILE), &doc)
    }

    pub fn stage_archive(&self, archive: &ArchiveTable) -> Result<StagedWrite, StoreError> {
        let doc = ArchiveDocRef {
            version: SCHEMA_VERSION,
            nodes: archive,
        };
        stage_json(&self.dir.join(GRAVEYARD_FILE), &doc)
    }
}

fn read_versioned<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "table missing, starting empty");
            return Ok(None);
        }
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let corrupt = |source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    };
    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(corrupt)?;

    let found = value.get("version").and_then(serde_json::Value::as_u64);
    if found != Some(SCHEMA_VERSION) {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found,
        });
    }

    serde_json::from_value(value).map(Some).map_err(corrupt)
}

fn stage_json<T: Serialize>(path: &Path, doc: &T) -> Result<StagedWrite, StoreError> {
    let body = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    StagedWrite::stage(path, &body)
}

/// What a staged file replaces: one of our tables, or a published document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Document {
    Table,
    Output,
}

impl Document {
    fn write_error(self, path: &Path, source: io::Error) -> StoreError {
        let path = path.to_path_buf();
        match self {
            Self::Table => StoreError::Write { path, source },
            Self::Output => StoreError::OutputWrite { path, source },
        }
    }
}

/// A fully written and synced temporary file waiting to replace its target.
///
/// Dropping an uncommitted write removes the temporary file; the target is
/// left untouched.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: PathBuf,
    target: PathBuf,
    document: Document,
    committed: bool,
}

impl StagedWrite {
    /// Stage a table document next to `target`.
    pub fn stage(target: &Path, bytes: &[u8]) -> Result<Self, StoreError> {
        Self::stage_as(target, bytes, Document::Table)
    }

    /// Stage a feed or report; failures report as output write errors.
    pub fn stage_output(target: &Path, bytes: &[u8]) -> Result<Self, StoreError> {
        Self::stage_as(target, bytes, Document::Output)
    }

    /// Write `bytes` to `<target>.tmp`, flush, and sync to stable storage.
    fn stage_as(target: &Path, bytes: &[u8], document: Document) -> Result<Self, StoreError> {
        let tmp = tmp_path(target);
        let write_err = |source| document.write_error(&tmp, source);

        let mut file = File::create(&tmp).map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.flush().map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        Ok(Self {
            tmp,
            target: target.to_path_buf(),
            document,
            committed: false,
        })
    }

    /// Atomically replace the target with the staged file.
    pub fn commit(mut self) -> Result<(), StoreError> {
        fs::rename(&self.tmp, &self.target)
            .map_err(|source| self.document.write_error(&self.target, source))?;
        self.committed = true;
        debug!(path = %self.target.display(), "replaced");
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Stage and commit a published document in one step.
pub fn write_output(target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    StagedWrite::stage_output(target, bytes)?.commit()
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}
