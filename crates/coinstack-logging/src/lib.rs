//! Logging setup for coinstack binaries.
//!
//! Installs a `tracing` subscriber filtered by `RUST_LOG`, optionally teeing
//! events to a log file whose numbered backups are rotated on startup.

mod rotate;

pub use self::rotate::{shift, LogRotator};

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Hard cap on numbered backup slots.
pub const MAX_BACKUP_SLOTS: usize = 1_000;

/// Install the global subscriber.
///
/// With a `log_file`, existing backups are rotated first (`keep_backups` of
/// them retained) and events are written both to stderr and, without ANSI
/// colors, to the file. Fails if a global subscriber is already set.
pub fn init_logging(log_file: Option<&Path>, keep_backups: usize) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            LogRotator::new(path, keep_backups, MAX_BACKUP_SLOTS).rotate()?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .try_init()
                .map_err(io::Error::other)?;
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .try_init()
                .map_err(io::Error::other)?;
        }
    }
    Ok(())
}
