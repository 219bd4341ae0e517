//! Console and file logging

use anyhow::Context;
use chrono::Utc;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install a stderr layer and a plain-text file layer under `logs_dir`.
///
/// Returns the path of the log file.
pub fn init(logs_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create log directory {}", logs_dir.display()))?;

    let path = logs_dir.join(format!("keyflow_{}.log", Utc::now().format("%Y-%m-%d_%H-%M-%S")));
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(path)
}
