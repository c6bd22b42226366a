// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Demo binary: a minimal GAP/GATT attribute table served over a
//! length-prefixed TCP stand-in for L2CAP (§10.4).

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use att_server_rs::{
    att::db::{Attribute, StaticDatabase},
    cfg::{cli::resolve_config_path, config::ServerConfig, logger::init_logger},
    channel::TcpChannel,
    server::AttConnection,
    uuid::Uuid,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// GAP service declaration (0x2800) spanning handles 0x0001-0x0003, plus
/// its Device Name characteristic (0x2A00) at 0x0002/0x0003.
fn demo_database() -> Result<StaticDatabase> {
    let attrs = vec![
        Attribute::static_group(
            0x0001,
            0x0003,
            Uuid::Uuid16(0x2800),
            0x1800u16.to_le_bytes().to_vec(),
        ),
        Attribute::static_value(
            0x0002,
            Uuid::Uuid16(0x2803),
            vec![0x02, 0x03, 0x00, 0x00, 0x2A],
        ),
        Attribute::static_value(0x0003, Uuid::Uuid16(0x2A00), b"att-server-rs".to_vec()),
    ];
    StaticDatabase::new(attrs)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = resolve_config_path("demos/config.yaml")
        .and_then(ServerConfig::load_from_file)
        .context("failed to resolve or load config")?;

    let _logger_guard = init_logger(&cfg.logging)?;

    let db: Arc<StaticDatabase> = Arc::new(demo_database().context("invalid attribute database")?);
    let listener = TcpListener::bind(&cfg.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind_address))?;
    info!(addr = %cfg.server.bind_address, "listening");

    // Handed out to every accepted connection so Ctrl-C can ask each
    // transaction loop to stop instead of killing the process out from
    // under an in-flight write.
    let live_connections: Arc<Mutex<Vec<CancellationToken>>> = Arc::new(Mutex::new(Vec::new()));

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, closing active connections");
                for token in live_connections.lock().expect("connections lock poisoned").drain(..) {
                    token.cancel();
                }
                return Ok(());
            },
            accepted = listener.accept() => accepted?,
        };
        info!(%peer, "accepted connection");

        let db = db.clone();
        let rx_mtu = cfg.att.rx_mtu;
        let timeout = Duration::from_secs(cfg.att.indication_timeout_secs);

        let (reader, writer) = match TcpChannel::from_stream(stream) {
            Ok(halves) => halves,
            Err(e) => {
                error!(%peer, error = %e, "failed to prepare channel");
                continue;
            },
        };
        let (conn, _sender) = match AttConnection::new(reader, writer, db, rx_mtu, timeout) {
            Ok(pair) => pair,
            Err(e) => {
                error!(%peer, error = %e, "failed to start connection");
                continue;
            },
        };
        live_connections
            .lock()
            .expect("connections lock poisoned")
            .push(conn.shutdown_handle());

        tokio::spawn(async move {
            if let Err(e) = conn.run().await {
                error!(%peer, error = %e, "connection ended with error");
            } else {
                info!(%peer, "connection closed");
            }
        });
    }
}
