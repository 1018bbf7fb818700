//! Node presence state machine.
//!
//! One run consists of three phases over the active state table:
//!
//! 1. **mark**: every known node is flagged unavailable.
//! 2. **fold**: each snapshot entry is matched (or created), flagged
//!    available, and its transitions are turned into events.
//! 3. **sweep**: nodes still unavailable were absent from the snapshot; they
//!    are removed from the table, a `drop` event is emitted for each, and
//!    they are handed back to the caller for archiving.
//!
//! # Invariants
//!
//! - An offline report is only accepted once the node's last-seen time is at
//!   least `offline_threshold` in the past; until then the previous flag is
//!   kept. Online reports are accepted immediately.
//! - Presence events fire on accepted flag changes only, so folding the same
//!   snapshot twice emits nothing the second time.
//! - An unknown node starts from an offline record, so one that is older
//!   than the new-node window but reported online emits `online` without
//!   `new`. This includes nodes returning from the graveyard.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::RunConfig;
use crate::event::{EventKind, EventRecord};
use crate::model::{NodeId, NodeRecord};
use crate::snapshot::{Snapshot, SnapshotNode};

/// The active node table, keyed by node id.
pub type StateTable = BTreeMap<NodeId, NodeRecord>;

/// Receiver for events detected by the state machine.
pub trait EventSink {
    fn emit(&mut self, event: EventRecord);
}

impl EventSink for Vec<EventRecord> {
    fn emit(&mut self, event: EventRecord) {
        self.push(event);
    }
}

/// Result of a complete mark/fold/sweep cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Active table without the dropped nodes.
    pub state: StateTable,
    /// Nodes removed by the sweep, with their final records.
    pub dropped: Vec<(NodeId, NodeRecord)>,
}

/// Applies snapshots to a state table relative to a fixed `now`.
#[derive(Debug, Clone)]
pub struct PresenceTracker<'a> {
    now: DateTime<Utc>,
    new_node_limit: DateTime<Utc>,
    offline_limit: DateTime<Utc>,
    map_node_url: &'a str,
}

impl<'a> PresenceTracker<'a> {
    #[must_use]
    pub fn new(config: &'a RunConfig, now: DateTime<Utc>) -> Self {
        Self {
            now,
            new_node_limit: now - config.new_node_window,
            offline_limit: now - config.offline_threshold,
            map_node_url: &config.map_node_url,
        }
    }

    /// Run mark, fold and sweep over `previous` and return the new table.
    pub fn apply(
        &self,
        snapshot: &Snapshot,
        mut previous: StateTable,
        sink: &mut impl EventSink,
    ) -> Transition {
        mark(&mut previous);
        self.fold(&mut previous, snapshot, sink);
        let dropped = self.sweep(&mut previous, sink);
        Transition {
            state: previous,
            dropped,
        }
    }

    /// Fold every snapshot entry into `state`, emitting detected transitions.
    pub fn fold(&self, state: &mut StateTable, snapshot: &Snapshot, sink: &mut impl EventSink) {
        for node in &snapshot.nodes {
            self.fold_node(state, node, sink);
        }
    }

    fn fold_node(&self, state: &mut StateTable, node: &SnapshotNode, sink: &mut impl EventSink) {
        let known = state.contains_key(&node.id);
        let record = state
            .entry(node.id.clone())
            .or_insert_with(|| NodeRecord::unseen(node.firstseen, node.lastseen));

        let is_new = !known && node.firstseen > self.new_node_limit;
        let old_online = record.online;
        let old_hostname = std::mem::replace(&mut record.hostname, node.hostname.clone());

        record.available = true;
        record.firstseen = node.firstseen;
        record.lastseen = node.lastseen;

        let offline_accepted = !node.online && node.lastseen <= self.offline_limit;
        if node.online || offline_accepted {
            record.online = node.online;
        }

        let url = self.node_url(&node.id);

        if is_new {
            emit(sink, node.firstseen, EventKind::New, &node.hostname, url.clone());
        }

        let presence = if is_new {
            if record.online {
                Some(EventKind::Online)
            } else if offline_accepted {
                Some(EventKind::Offline)
            } else {
                None
            }
        } else if record.online != old_online {
            Some(if record.online {
                EventKind::Online
            } else {
                EventKind::Offline
            })
        } else {
            None
        };

        match presence {
            Some(EventKind::Online) => {
                emit(sink, node.firstseen, EventKind::Online, &node.hostname, url.clone());
            }
            Some(kind) => {
                emit(sink, node.lastseen, kind, &node.hostname, url.clone());
            }
            None => {}
        }

        if !old_hostname.is_empty() && old_hostname != node.hostname {
            let message = format!("{old_hostname} -> {}", node.hostname);
            emit(sink, node.lastseen, EventKind::Rename, &message, url);
        }
    }

    /// Remove every node not marked available and emit a `drop` event for it.
    pub fn sweep(
        &self,
        state: &mut StateTable,
        sink: &mut impl EventSink,
    ) -> Vec<(NodeId, NodeRecord)> {
        let gone: Vec<NodeId> = state
            .iter()
            .filter(|(_, record)| !record.available)
            .map(|(id, _)| id.clone())
            .collect();

        let mut dropped = Vec::with_capacity(gone.len());
        for id in gone {
            if let Some(record) = state.remove(&id) {
                let url = self.node_url(&id);
                emit(sink, self.now, EventKind::Drop, &record.hostname, url);
                dropped.push((id, record));
            }
        }
        dropped
    }

    fn node_url(&self, id: &NodeId) -> Option<String> {
        if self.map_node_url.is_empty() {
            None
        } else {
            Some(format!("{}{}", self.map_node_url, id))
        }
    }
}

fn emit(
    sink: &mut impl EventSink,
    timestamp: DateTime<Utc>,
    kind: EventKind,
    message: &str,
    url: Option<String>,
) {
    debug!(%kind, %timestamp, text = message, "node event");
    sink.emit(EventRecord::new(timestamp, kind, message, url));
}

/// Flag every known node unavailable before folding a new snapshot.
pub fn mark(state: &mut StateTable) {
    for record in state.values_mut() {
        record.available = false;
    }
}
