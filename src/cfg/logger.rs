// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Logger initialization (§10.3).
//!
//! A single-connection ATT server has no cross-session correlation
//! problem to solve, so this keeps the `tracing` + `tracing-subscriber` +
//! `tracing-appender` stack but drops the custom JSON span-capture
//! formatter in favor of `tracing_subscriber::fmt`'s built-in formatter.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::{non_blocking::WorkerGuard, rolling::Rotation};
use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter};

use crate::cfg::config::{LogConfig, LogOutput};

/// Initializes the global `tracing` subscriber from `cfg`. The returned
/// guard must be kept alive for the process lifetime - dropping it stops
/// the non-blocking writer from flushing.
pub fn init_logger(cfg: &LogConfig) -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_new(&cfg.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level from config or env")?;

    let (writer, guard) = make_writer(cfg)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set global default subscriber: {e}"))?;

    Ok(guard)
}

fn make_writer(cfg: &LogConfig) -> Result<(BoxMakeWriter, WorkerGuard)> {
    Ok(match cfg.output {
        LogOutput::Stdout => {
            let (w, g) = tracing_appender::non_blocking(std::io::stdout());
            (BoxMakeWriter::new(w), g)
        },
        LogOutput::Stderr => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (BoxMakeWriter::new(w), g)
        },
        LogOutput::File => {
            let path_str = cfg
                .file_path
                .as_deref()
                .context("logging.FilePath is required for output=file")?;
            let path = PathBuf::from(path_str);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file_appender = tracing_appender::rolling::RollingFileAppender::new(
                Rotation::NEVER,
                dir,
                path.file_name().unwrap_or_default(),
            );
            let (w, g) = tracing_appender::non_blocking(file_appender);
            (BoxMakeWriter::new(w), g)
        },
    })
}
