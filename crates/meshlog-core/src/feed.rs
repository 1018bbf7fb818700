//! Feed projection and Atom rendering.
//!
//! The projector takes the newest `max_feed_entries` events of a cleaned-up
//! log and presents them newest first. Rendering produces an Atom 1.0
//! document; every text node and attribute value is XML-escaped.

use chrono::{DateTime, SecondsFormat, Utc};
use std::borrow::Cow;
use std::fmt::Write as _;

use crate::config::FeedMeta;
use crate::event::EventRecord;
use crate::eventlog::EventLog;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// One rendered feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// `"[KIND] message"`, also used as the entry content.
    pub title: String,
    /// `urn:uuid:<event id>`.
    pub id: String,
    pub published: String,
    pub updated: String,
    pub link: Option<String>,
}

impl From<&EventRecord> for FeedEntry {
    fn from(event: &EventRecord) -> Self {
        let stamp = format_timestamp(event.timestamp);
        Self {
            title: format!("[{}] {}", event.kind.label(), event.message),
            id: format!("urn:uuid:{}", event.id),
            published: stamp.clone(),
            updated: stamp,
            link: event.url.clone().filter(|url| !url.is_empty()),
        }
    }
}

/// The newest `max_entries` events of `log`, newest first.
#[must_use]
pub fn window(log: &EventLog, max_entries: usize) -> Vec<&EventRecord> {
    log.recent(max_entries).iter().rev().collect()
}

/// Project the feed window into feed entries.
#[must_use]
pub fn project(log: &EventLog, max_entries: usize) -> Vec<FeedEntry> {
    window(log, max_entries)
        .into_iter()
        .map(FeedEntry::from)
        .collect()
}

/// Feed timestamp form: RFC 3339, whole seconds, `Z` suffix.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render a complete Atom document.
#[must_use]
pub fn render_atom(meta: &FeedMeta, updated: DateTime<Utc>, entries: &[FeedEntry]) -> String {
    let author = escape_xml(&meta.author);
    let mut out = String::with_capacity(512 + entries.len() * 384);

    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    let _ = writeln!(out, "<feed xmlns=\"{ATOM_NS}\">");
    let _ = writeln!(out, "  <title>{}</title>", escape_xml(&meta.title));
    let _ = writeln!(out, "  <id>{}</id>", escape_xml(&meta.id));
    let _ = writeln!(out, "  <updated>{}</updated>", format_timestamp(updated));
    let _ = writeln!(out, "  <author><name>{author}</name></author>");

    for entry in entries {
        let title = escape_xml(&entry.title);
        out.push_str("  <entry>\n");
        let _ = writeln!(out, "    <title>{title}</title>");
        let _ = writeln!(out, "    <id>{}</id>", escape_xml(&entry.id));
        let _ = writeln!(out, "    <published>{}</published>", entry.published);
        let _ = writeln!(out, "    <updated>{}</updated>", entry.updated);
        let _ = writeln!(out, "    <author><name>{author}</name></author>");
        if let Some(link) = &entry.link {
            let _ = writeln!(out, "    <link href=\"{}\"/>", escape_xml(link));
        }
        let _ = writeln!(out, "    <content type=\"text\">{title}</content>");
        out.push_str("  </entry>\n");
    }

    out.push_str("</feed>\n");
    out
}

fn escape_xml(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len() + 16);
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}
