//! Logging and tracing configuration
//!
//! The CLI logs compact lines to stderr. `uiharness run` additionally writes a
//! detailed log to `<logs_dir>/uiharness.log` so a failing run can be read
//! after the fact next to its screenshots and report.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Name of the run log inside `logs_dir`
pub const LOG_FILE_NAME: &str = "uiharness.log";

fn default_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing for commands that don't produce a run log
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(default_filter("uiharness=info,warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for a test run
///
/// Progress goes to stdout through the console hooks, so stderr only shows
/// warnings; the log file gets everything at debug.
///
/// The returned guard flushes the file writer when dropped; hold it until the
/// run is finished. If the log directory can't be created, logging falls back
/// to stderr only and `None` is returned for the path.
pub fn init_run(logs_dir: &Path) -> (Option<WorkerGuard>, Option<PathBuf>) {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(default_filter("warn"))
        .boxed()];

    if let Err(e) = std::fs::create_dir_all(logs_dir) {
        eprintln!("Warning: Could not create log directory {}: {}", logs_dir.display(), e);
        tracing_subscriber::registry().with(layers).init();
        return (None, None);
    }

    let appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    layers.push(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(default_filter("uiharness=debug,warn"))
            .boxed(),
    );

    tracing_subscriber::registry().with(layers).init();

    (Some(guard), Some(logs_dir.join(LOG_FILE_NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test that installs the global subscriber
    #[test]
    fn run_log_is_written_to_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let (guard, path) = init_run(&logs);
        tracing::warn!("checkout attempt 1 failed");
        drop(guard);

        let path = path.unwrap();
        assert_eq!(path, logs.join(LOG_FILE_NAME));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("checkout attempt 1 failed"));
    }
}
