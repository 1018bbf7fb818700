//! Shared front-end plumbing for the `nodes2eventlog` and `graveyard2rst`
//! binaries.

#![forbid(unsafe_code)]

use clap::Parser;
use meshlog_core::pipeline::PipelineError;
use std::env;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status for usage errors such as a wrong argument count.
pub const USAGE_EXIT_CODE: i32 = 1;

/// Install the global tracing subscriber.
///
/// `MESHLOG_LOG` takes an `EnvFilter` directive; `MESHLOG_LOG_FORMAT=json`
/// switches to JSON lines. Logs go to stderr.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("MESHLOG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "meshlog_core=debug,meshlog_cli=debug,info"
        } else {
            "meshlog_core=info,meshlog_cli=info,warn"
        })
    });

    let format = env::var("MESHLOG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Parse arguments, exiting with [`USAGE_EXIT_CODE`] on usage errors.
///
/// `--help` and `--version` still exit successfully.
pub fn parse_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            std::process::exit(USAGE_EXIT_CODE);
        }
        Err(err) => err.exit(),
    }
}

/// Log a pipeline failure with its machine code and hint, then hand it on.
pub fn report(err: PipelineError) -> anyhow::Error {
    let code = err.code();
    error!(code = %code, hint = code.hint().unwrap_or(""), "{}", code.message());
    anyhow::Error::new(err).context(format!("{code}: {}", code.message()))
}
