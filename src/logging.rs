use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

pub fn log_file_name(now: DateTime<Local>) -> String {
    format!("tubescriber_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Installs the global subscriber: `info` and up on the console (overridable
/// through `RUST_LOG`), errors only in a fresh timestamped file under
/// `log_dir`. Returns the log file path.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir).with_context(|| format!("Creating {}", log_dir.display()))?;
    let path = log_dir.join(log_file_name(Local::now()));
    let file = File::create(&path).with_context(|| format!("Creating {}", path.display()))?;

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).with_filter(console_filter);
    let errors = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(console)
        .with(errors)
        .try_init()
        .context("installing log subscriber")?;
    Ok(path)
}
