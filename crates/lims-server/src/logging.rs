//! Logging bootstrap and log tail
//!
//! Events go to stdout and to an append-only file; the file backs `/logs`.

use lims_core::{LimsError, LimsResult};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Lines returned by the log endpoint
pub const LOG_TAIL_LINES: usize = 300;

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default `info` filter.
///
/// # Errors
/// `LimsError::Io` if the log file cannot be opened, `LimsError::Config` if a
/// subscriber is already installed
pub fn init(log_file: &Path) -> LimsResult<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LimsError::io(parent, e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| LimsError::io(log_file, e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .map_err(|e| LimsError::Config(format!("cannot install log subscriber: {e}")))
}

/// Last `limit` lines of the log file; a missing file is an empty log
///
/// # Errors
/// `LimsError::Io` / `LimsError::PermissionDenied` if the file exists but
/// cannot be read
pub async fn read_log_tail(log_file: &Path, limit: usize) -> LimsResult<Vec<String>> {
    let bytes = match tokio::fs::read(log_file).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LimsError::io(log_file, e)),
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(limit);
    Ok(lines[start..].iter().map(|l| (*l).to_string()).collect())
}
