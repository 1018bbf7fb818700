//! One complete invocation of each tool.
//!
//! `nodes2eventlog`: read snapshot → lock db → load tables → mark/fold/sweep
//! → archive dropped nodes → trim log → project feed → stage every output →
//! replace state, event log, archive, feed.
//!
//! Nothing is written until every input has been read and validated, and
//! every output is staged (written and synced) before the first rename, so a
//! failed run leaves the previous documents in place.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{ConfigError, GraveyardConfig, RunConfig};
use crate::error::ErrorCode;
use crate::feed;
use crate::graveyard;
use crate::lock::{DbLock, LockError};
use crate::model::ArchiveRecord;
use crate::presence::PresenceTracker;
use crate::snapshot::{Snapshot, SnapshotError};
use crate::store::{StagedWrite, Store, StoreError, write_output};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl PipelineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config(err) => err.code(),
            Self::Snapshot(err) => err.code(),
            Self::Store(err) => err.code(),
            Self::Lock(err) => err.code(),
        }
    }
}

/// Counters describing one `nodes2eventlog` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub nodes_in_snapshot: usize,
    pub events_emitted: usize,
    pub nodes_dropped: usize,
    pub nodes_resurrected: usize,
    pub events_evicted: usize,
    pub log_len: usize,
    pub feed_len: usize,
}

/// Counters describing one `graveyard2rst` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraveyardSummary {
    pub archived: usize,
    pub reported: usize,
}

/// Paths for one `nodes2eventlog` run.
#[derive(Debug, Clone, Copy)]
pub struct EventlogPaths<'a> {
    pub snapshot: &'a Path,
    pub db_dir: &'a Path,
    pub feed: &'a Path,
}

/// Fold one snapshot into the database and regenerate the feed.
pub fn run_nodes2eventlog(
    paths: EventlogPaths<'_>,
    config: &RunConfig,
    now: DateTime<Utc>,
    lock_timeout: Duration,
) -> Result<RunSummary, PipelineError> {
    let snapshot = Snapshot::read(paths.snapshot)?;
    debug!(nodes = snapshot.len(), "snapshot parsed");

    let store = Store::open(paths.db_dir)?;
    let _lock = DbLock::exclusive(&store.lock_path(), lock_timeout)?;

    let previous = store.load_state()?;
    let mut log = store.load_event_log()?;
    let mut archive = store.load_archive()?;
    info!(
        known = previous.len(),
        events = log.len(),
        archived = archive.len(),
        "tables loaded"
    );

    let logged_before = log.len();
    let transition = PresenceTracker::new(config, now).apply(&snapshot, previous, &mut log);
    let events_emitted = log.len() - logged_before;

    let mut nodes_resurrected = 0;
    for id in transition.state.keys() {
        if archive.remove(id).is_some() {
            debug!(node_id = %id, "node returned from the graveyard");
            nodes_resurrected += 1;
        }
    }
    for (id, record) in &transition.dropped {
        archive.insert(id.clone(), ArchiveRecord::from_node(id.clone(), record));
    }

    let events_evicted = log.cleanup(config.max_log_entries);
    let entries = feed::project(&log, config.max_feed_entries);
    let document = feed::render_atom(&config.feed, now, &entries);

    let staged: [StagedWrite; 4] = [
        store.stage_state(&transition.state)?,
        store.stage_event_log(&log)?,
        store.stage_archive(&archive)?,
        StagedWrite::stage_output(paths.feed, document.as_bytes())?,
    ];
    for write in staged {
        write.commit()?;
    }

    let summary = RunSummary {
        nodes_in_snapshot: snapshot.len(),
        events_emitted,
        nodes_dropped: transition.dropped.len(),
        nodes_resurrected,
        events_evicted,
        log_len: log.len(),
        feed_len: entries.len(),
    };
    info!(
        nodes = summary.nodes_in_snapshot,
        events = summary.events_emitted,
        dropped = summary.nodes_dropped,
        evicted = summary.events_evicted,
        log_len = summary.log_len,
        feed_len = summary.feed_len,
        "event log updated"
    );
    Ok(summary)
}

/// Render the graveyard report for the archive in `db_dir`.
pub fn run_graveyard(
    db_dir: &Path,
    out: &Path,
    config: &GraveyardConfig,
    now: DateTime<Utc>,
    lock_timeout: Duration,
) -> Result<GraveyardSummary, PipelineError> {
    let store = Store::open(db_dir)?;
    let archive = {
        let _lock = DbLock::shared(&store.lock_path(), lock_timeout)?;
        store.load_archive()?
    };

    let zones = graveyard::zones(&archive, now, config.horizon);
    let report = graveyard::render_rst(&config.title, &zones);
    write_output(out, report.as_bytes())?;

    let summary = GraveyardSummary {
        archived: archive.len(),
        reported: graveyard::zone_population(&zones),
    };
    info!(
        archived = summary.archived,
        reported = summary.reported,
        "graveyard report written"
    );
    Ok(summary)
}
