// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::att::mtu::{MAX_MTU, MIN_MTU};

/// Top-level server configuration, loaded from YAML (§10.1).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    /// ATT-layer parameters.
    pub att: AttConfig,
    /// Transport-layer parameters for the demo TCP binary.
    pub server: NetworkConfig,
    /// Logging parameters.
    pub logging: LogConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AttConfig {
    #[serde(rename = "RxMtu")]
    /// The rxMTU this server advertises (§4.6). Must be in
    /// `[23, 517]`.
    pub rx_mtu: u16,

    #[serde(rename = "IndicationTimeoutSecs", default = "default_indication_timeout")]
    /// How long to wait for a Handle Value Confirmation before giving up on
    /// an indication (§4.5).
    pub indication_timeout_secs: u64,
}

const fn default_indication_timeout() -> u64 {
    30
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NetworkConfig {
    #[serde(rename = "BindAddress")]
    /// Address the demo binary listens on, e.g. `"127.0.0.1:4242"`.
    pub bind_address: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(rename = "Level")]
    /// An `EnvFilter` directive string, e.g. `"info"` or
    /// `"att_server_rs=debug,warn"`.
    pub level: String,
    #[serde(rename = "Output")]
    pub output: LogOutput,
    #[serde(rename = "FilePath", skip_serializing_if = "Option::is_none")]
    /// Required when `output = file`.
    pub file_path: Option<String>,
}

impl ServerConfig {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ServerConfig =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants that the type system can't express on its own.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            (MIN_MTU..=MAX_MTU).contains(&self.att.rx_mtu),
            "RxMtu must be in [{MIN_MTU}, {MAX_MTU}], got {}",
            self.att.rx_mtu
        );
        ensure!(
            self.att.indication_timeout_secs >= 1,
            "IndicationTimeoutSecs must be >= 1"
        );
        ensure!(
            !self.server.bind_address.is_empty(),
            "BindAddress must not be empty"
        );
        if matches!(self.logging.output, LogOutput::File) {
            ensure!(
                self.logging.file_path.is_some(),
                "logging.FilePath is required when Output=file"
            );
        }
        Ok(())
    }
}
