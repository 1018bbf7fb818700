//! Graveyard report: recently dropped nodes grouped by month.
//!
//! Archived nodes last seen within the horizon are bucketed into zones by
//! the (year, month) of their last-seen time. Within a zone the most
//! recently departed node comes first; ties go to the most recently arrived.
//! The report lists years and months newest first.

use chrono::{DateTime, Datelike, Duration, Utc};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::{ArchiveRecord, NodeId};

/// The archive table, keyed by node id.
pub type ArchiveTable = BTreeMap<NodeId, ArchiveRecord>;

/// year -> month -> ordered nodes.
pub type Zones<'a> = BTreeMap<i32, BTreeMap<u32, Vec<&'a ArchiveRecord>>>;

/// Bucket the archived nodes last seen in `[now - horizon, now]`.
#[must_use]
pub fn zones(archive: &ArchiveTable, now: DateTime<Utc>, horizon: Duration) -> Zones<'_> {
    let oldest = now - horizon;
    let mut zones: Zones<'_> = BTreeMap::new();

    for node in archive.values() {
        if node.lastseen < oldest || node.lastseen > now {
            continue;
        }
        zones
            .entry(node.lastseen.year())
            .or_default()
            .entry(node.lastseen.month())
            .or_default()
            .push(node);
    }

    for months in zones.values_mut() {
        for nodes in months.values_mut() {
            nodes.sort_by_key(|node| {
                Reverse((node.lastseen.date_naive(), node.firstseen.date_naive()))
            });
        }
    }

    zones
}

/// Number of nodes across all zones.
#[must_use]
pub fn zone_population(zones: &Zones<'_>) -> usize {
    zones
        .values()
        .flat_map(BTreeMap::values)
        .map(Vec::len)
        .sum()
}

/// Render zones as a reStructuredText document.
#[must_use]
pub fn render_rst(title: &str, zones: &Zones<'_>) -> String {
    let mut out = String::new();
    let bar = "=".repeat(title.chars().count());
    let _ = writeln!(out, "{bar}\n{title}\n{bar}");

    for (year, months) in zones.iter().rev() {
        let heading = year.to_string();
        let _ = writeln!(out, "\n{heading}\n{}", "=".repeat(heading.len()));

        for (month, nodes) in months.iter().rev() {
            let heading = format!("{year}-{month:02}");
            let _ = writeln!(out, "\n{heading}\n{}\n", "-".repeat(heading.len()));

            for node in nodes {
                let _ = writeln!(out, "* {}", node.hostname);
                let _ = writeln!(out, "  - id: {}", node.id);
                let _ = writeln!(
                    out,
                    "  - lifespan: {} - {}",
                    node.firstseen.format("%Y-%m-%d"),
                    node.lastseen.format("%Y-%m-%d")
                );
                out.push('\n');
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn archived(id: &str, first: DateTime<Utc>, last: DateTime<Utc>) -> (NodeId, ArchiveRecord) {
        let record = ArchiveRecord {
            id: NodeId::from(id),
            hostname: format!("host-{id}"),
            firstseen: first,
            lastseen: last,
        };
        (record.id.clone(), record)
    }

    #[test]
    fn only_recent_departures_are_bucketed() {
        let archive = ArchiveTable::from([
            archived("recent", day(2023, 6, 1), day(2024, 3, 15)),
            archived("ancient", day(2022, 1, 1), day(2023, 11, 1)),
        ]);

        let z = zones(&archive, day(2024, 3, 20), Duration::days(14));

        assert_eq!(zone_population(&z), 1);
        assert_eq!(z[&2024][&3][0].id.as_str(), "recent");
        assert!(!z.contains_key(&2023));
    }

    #[test]
    fn horizon_spanning_month_boundary_yields_two_zones() {
        let archive = ArchiveTable::from([
            archived("a", day(2023, 1, 1), day(2024, 2, 28)),
            archived("b", day(2023, 1, 1), day(2024, 3, 2)),
        ]);
        let z = zones(&archive, day(2024, 3, 5), Duration::days(14));
        assert_eq!(z[&2024].len(), 2);
        assert_eq!(z[&2024][&2][0].id.as_str(), "a");
        assert_eq!(z[&2024][&3][0].id.as_str(), "b");
    }

    #[test]
    fn future_records_are_excluded() {
        let archive = ArchiveTable::from([archived("x", day(2024, 1, 1), day(2024, 4, 1))]);
        let z = zones(&archive, day(2024, 3, 20), Duration::days(14));
        assert!(z.is_empty());
    }

    #[test]
    fn bucket_orders_by_departure_then_arrival_descending() {
        let archive = ArchiveTable::from([
            archived("early-gone", day(2023, 5, 1), day(2024, 3, 10)),
            archived("late-gone-old", day(2022, 5, 1), day(2024, 3, 14)),
            archived("late-gone-young", day(2024, 1, 1), day(2024, 3, 14)),
        ]);
        let z = zones(&archive, day(2024, 3, 20), Duration::days(14));
        let ids: Vec<&str> = z[&2024][&3].iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["late-gone-young", "late-gone-old", "early-gone"]);
    }

    #[test]
    fn report_lists_newest_zone_first() {
        let archive = ArchiveTable::from([
            archived("dec", day(2023, 2, 3), day(2023, 12, 30)),
            archived("jan", day(2023, 4, 5), day(2024, 1, 2)),
        ]);
        let z = zones(&archive, day(2024, 1, 5), Duration::days(14));
        let rst = render_rst("Graveyard", &z);

        let expected = "\
=========
Graveyard
=========

2024
====

2024-01
-------

* host-jan
  - id: jan
  - lifespan: 2023-04-05 - 2024-01-02


2023
====

2023-12
-------

* host-dec
  - id: dec
  - lifespan: 2023-02-03 - 2023-12-30

";
        assert_eq!(rst, expected);
    }

    #[test]
    fn empty_report_has_only_title() {
        let rst = render_rst("Graveyard", &Zones::new());
        assert_eq!(rst, "=========\nGraveyard\n=========\n");
    }
}
