#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use meshlog_core::config::GraveyardConfig;
use meshlog_core::lock::DEFAULT_LOCK_TIMEOUT;
use meshlog_core::pipeline;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Render recently dropped mesh nodes as a monthly reStructuredText report",
    long_about = None
)]
struct Cli {
    /// Database directory holding the graveyard table.
    db_dir: PathBuf,

    /// reStructuredText output path.
    output_rst: PathBuf,

    /// Seconds to wait for a running nodes2eventlog to release the database.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT.as_secs())]
    lock_timeout: u64,
}

fn main() -> anyhow::Result<()> {
    meshlog_cli::init_tracing();
    let cli: Cli = meshlog_cli::parse_or_exit();

    let config = GraveyardConfig::load(&cli.db_dir)
        .map_err(|err| meshlog_cli::report(err.into()))
        .with_context(|| format!("invalid configuration for {}", cli.db_dir.display()))?;

    pipeline::run_graveyard(
        &cli.db_dir,
        &cli.output_rst,
        &config,
        chrono::Utc::now(),
        Duration::from_secs(cli.lock_timeout),
    )
    .map_err(meshlog_cli::report)?;

    Ok(())
}
