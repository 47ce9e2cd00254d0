use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub const LOG_FILE_NAME: &str = "rpchat.log";

/**
 * \brief Logging options collected from flags and the environment.
 */
#[derive(Debug, Clone, Default)]
pub struct TelemetryOptions {
    /** \brief Default to debug instead of info when RUST_LOG is unset */
    pub verbose: bool,
    /** \brief Also append to `<dir>/rpchat.log` when set */
    pub log_dir: Option<PathBuf>,
}

/**
 * \brief Install the global tracing subscriber: stderr plus an optional log file.
 */
pub fn init(opts: &TelemetryOptions) -> Result<()> {
    let default_level = if opts.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(UtcTime::new(Rfc3339))
        .with_target(false);

    let file_layer = match &opts.log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_writer(Mutex::new(open_log_file(dir)?))
                .with_timer(UtcTime::new(Rfc3339))
                .with_ansi(false)
                .boxed(),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}

fn open_log_file(dir: &Path) -> Result<std::fs::File> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create log dir {}", dir.display()))?;
    }
    let path = dir.join(LOG_FILE_NAME);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))
}
