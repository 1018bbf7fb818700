#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use meshlog_core::config::RunConfig;
use meshlog_core::lock::DEFAULT_LOCK_TIMEOUT;
use meshlog_core::pipeline::{self, EventlogPaths};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Fold a mesh node roster into the event log and regenerate the Atom feed",
    long_about = None,
    after_help = "ENVIRONMENT:\n    MAX_LOG_ENTRIES    event log retention cap (default 10000)\n    MAX_FEED_ENTRIES   feed length (default 100)\n    MAP_NODE_URL       prefix for node deep links\n    OFFLINE_THRESHOLD  minutes before an offline report is accepted (default 0)\n    FEED_TITLE, FEED_ID  feed metadata\n    MESHLOG_LOG        log filter (e.g. debug)"
)]
struct Cli {
    /// Meshviewer nodes.json snapshot.
    input_nodes_json: PathBuf,

    /// Database directory holding state, event log and graveyard tables.
    db_dir: PathBuf,

    /// Atom feed output path.
    output_feed: PathBuf,

    /// Seconds to wait for a concurrent run to release the database.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT.as_secs())]
    lock_timeout: u64,
}

fn main() -> anyhow::Result<()> {
    meshlog_cli::init_tracing();
    let cli: Cli = meshlog_cli::parse_or_exit();

    let config = RunConfig::load(&cli.db_dir)
        .map_err(|err| meshlog_cli::report(err.into()))
        .with_context(|| format!("invalid configuration for {}", cli.db_dir.display()))?;

    let paths = EventlogPaths {
        snapshot: &cli.input_nodes_json,
        db_dir: &cli.db_dir,
        feed: &cli.output_feed,
    };
    pipeline::run_nodes2eventlog(
        paths,
        &config,
        chrono::Utc::now(),
        Duration::from_secs(cli.lock_timeout),
    )
    .map_err(meshlog_cli::report)?;

    Ok(())
}
