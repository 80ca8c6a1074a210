//! Diagnostics for hosts embedding the SDK.
//!
//! The SDK only emits `tracing` events; nothing is printed unless the host
//! installs a subscriber. These helpers install one: stderr plus a daily
//! `dp5-remote.log.<date>` file, plain text or JSON lines.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::AppConfig;
use crate::error::{Dp5Error, Dp5Result};

/// Prefix of the rolling log files; the appender adds the date.
pub const LOG_FILE_PREFIX: &str = "dp5-remote.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background log writer alive. Dropping it flushes the file.
pub struct LogGuard {
    _worker: WorkerGuard,
    log_dir: PathBuf,
}

impl LogGuard {
    /// Directory the log files are written to.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Install the global subscriber.
///
/// `level` is an `EnvFilter` directive such as `"info"` or
/// `"dp5_socket=debug,info"`; an unparsable directive falls back to `info`.
/// Fails with `Config` if a global subscriber is already installed.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> Dp5Result<LogGuard> {
    std::fs::create_dir_all(log_dir)?;
    let (writer, worker) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_PREFIX));

    let layers: Vec<BoxedLayer> = vec![console_layer(), file_layer(writer, json_output)];
    tracing_subscriber::registry()
        .with(layers)
        .with(level_filter(level))
        .try_init()
        .map_err(|e| Dp5Error::Config(format!("log subscriber already installed: {e}")))?;

    tracing::info!(
        "dp5 logging at {level} into {} (json: {json_output})",
        log_dir.display()
    );
    Ok(LogGuard {
        _worker: worker,
        log_dir: log_dir.to_path_buf(),
    })
}

/// Install the global subscriber from the `[logging]` section, writing
/// into `AppConfig::effective_log_dir`.
pub fn init_from_config(config: &AppConfig) -> Dp5Result<LogGuard> {
    let dir = config.effective_log_dir()?;
    init_logging(&config.logging.level, &dir, config.logging.json_output)
}

/// Console-only subscriber for tests and small tools. A no-op if one is
/// already installed.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(console_layer())
        .with(level_filter(level))
        .try_init();
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn console_layer() -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .boxed()
}

fn file_layer(writer: NonBlocking, json: bool) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}
