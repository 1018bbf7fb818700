//! meshlog-core library.
//!
//! Tracks the presence of mesh-network nodes across periodic roster
//! snapshots, keeps a bounded log of lifecycle events (new, online, offline,
//! rename, drop), and projects that history into an Atom feed and a monthly
//! graveyard report.
//!
//! # Conventions
//!
//! - **Errors**: one `thiserror` enum per module, each mapping to an
//!   [`error::ErrorCode`].
//! - **Logging**: use `tracing` macros (`info!`, `debug!`, `warn!`).
//! - **Time**: every operation takes `now` explicitly; nothing reads the
//!   clock below the binaries.

pub mod config;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod feed;
pub mod graveyard;
pub mod lock;
pub mod model;
pub mod pipeline;
pub mod presence;
pub mod snapshot;
pub mod store;
