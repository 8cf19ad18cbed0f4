//! Tracing subscriber setup.
//!
//! Human-facing logs go to stderr. Install runs also append plain-text
//! logs to the install log so a failed run can be diagnosed afterwards.
use crate::error::Result;
use crate::progress;
use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter from `RUST_LOG`, else `debug` when verbose and `info` otherwise.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(progress::log_writer),
        )
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
