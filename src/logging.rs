//! Structured logging backed by `tracing`.
//!
//! `init_logging` installs the global subscriber once: stdout always, plus a
//! daily-rotated file under the per-user data directory when it is writable.
//! Without `RUST_LOG`, dependencies log at `warn` and this crate at
//! `TRAFFIC_LIVE_LOG_LEVEL` (default `info`).

use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LEVEL_ENV: &str = "TRAFFIC_LIVE_LOG_LEVEL";
const LOG_FILE: &str = "traffic-live.log";

/// Filter directive used when `RUST_LOG` is unset.
fn default_directive(level: Option<&str>) -> String {
    let level = level.map(str::trim).filter(|l| !l.is_empty()).unwrap_or("info");
    format!("warn,traffic_live={level}")
}

fn env_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = std::env::var(LEVEL_ENV).ok();
    EnvFilter::try_new(default_directive(level.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new(default_directive(None)))
}

fn log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("traffic-live")
        .join("logs")
}

/// Daily-rotated file writer, or the reason it is unavailable.
fn file_writer(dir: &Path) -> Result<tracing_appender::non_blocking::NonBlocking, std::io::Error> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    FILE_GUARD.set(guard).ok();
    Ok(writer)
}

pub fn init_logging() {
    INIT.call_once(|| {
        let dir = log_dir();
        let file = file_writer(&dir);

        let file_layer = file.as_ref().ok().map(|writer| {
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer.clone())
        });
        let stdout_layer = fmt::layer()
            .with_target(true)
            .with_timer(UtcTime::rfc_3339());

        // Option<Layer> is itself a layer; None disables the file sink.
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stdout_layer)
            .with(file_layer)
            .init();

        match file {
            Ok(_) => info!(log_dir = %dir.display(), file = LOG_FILE, "Logging to stdout and rotating file"),
            Err(err) => warn!(log_dir = %dir.display(), error = %err, "Log directory unavailable, stdout only"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_scopes_level_to_crate() {
        assert_eq!(default_directive(None), "warn,traffic_live=info");
        assert_eq!(default_directive(Some("debug")), "warn,traffic_live=debug");
        assert_eq!(default_directive(Some("  ")), "warn,traffic_live=info");
    }

    #[test]
    fn test_default_directive_parses() {
        assert!(EnvFilter::try_new(default_directive(Some("trace"))).is_ok());
    }
}
