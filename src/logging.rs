//! Structured logging for the dispatch engine using the tracing crate.
//!
//! Writes daily-rotated log files under the XDG state directory and mirrors
//! events to stderr. Log level is controlled by `RUST_LOG` (default "info").
//! Old log files are pruned at startup, keeping the 7 most recent days.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;

/// Keeps the non-blocking appender worker alive for the program lifetime.
static APPENDER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "scribed.log";
const MAX_LOG_FILES: usize = 7;

/// Initializes the logging system. Call once at startup.
///
/// # Errors
/// - If the log directory cannot be determined or created
/// - If logging was already initialized
pub fn init_logging() -> Result<(), anyhow::Error> {
    let log_dir = log_dir()?;

    if let Err(e) = prune_old_logs(&log_dir) {
        eprintln!("Warning: failed to prune old logs: {e}");
    }

    let file_appender = rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    APPENDER_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Logging already initialized"))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Logging initialized, log dir: {}", log_dir.display());
    Ok(())
}

/// Resolves the log directory, preferring `XDG_STATE_HOME` and falling back
/// to `~/.local/state/scribed`.
fn log_dir() -> Result<PathBuf, anyhow::Error> {
    let dir = if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        PathBuf::from(xdg_state).join("scribed")
    } else {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        home.join(".local/state/scribed")
    };

    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Removes rotated log files beyond the retention window.
fn prune_old_logs(log_dir: &PathBuf) -> Result<(), anyhow::Error> {
    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            let file_name = path.file_name()?.to_string_lossy().to_string();

            // Rotated files look like scribed.log.YYYY-MM-DD
            if file_name.starts_with(LOG_FILE_PREFIX) && file_name.len() > LOG_FILE_PREFIX.len() {
                let modified = fs::metadata(&path).ok()?.modified().ok()?;
                Some((path, modified))
            } else {
                None
            }
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to delete old log file {}: {}", path.display(), e);
        }
    }

    Ok(())
}
