// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-connection transaction loop (§4.4): read one PDU, dispatch it,
//! write the response if any. Handle Value Confirmations are demultiplexed
//! to the outstanding indication's rendezvous instead of reaching the
//! dispatcher.
//!
//! Grounded on `client/client.rs`'s `ClientConnection::read_loop`: a
//! single owned read half drives a loop over a reused receive buffer,
//! while the write half is shared (here, with the notify/indicate sender)
//! behind a `tokio::sync::Mutex`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    att::{
        db::AttributeDatabase,
        dispatch::{self, Outcome},
        mtu::MtuState,
        opcode::byte,
    },
    channel::{ChannelReader, ChannelWriter},
    error::ServerError,
    server::notify::{ConfirmationRendezvous, IndicateSender},
};

/// Drives the request/response loop for one connected peer. Construction
/// also hands back an [`IndicateSender`] sharing the same write half and
/// MTU state, so the caller can push notifications/indications from
/// another task while this loop runs.
pub struct AttConnection<R, W> {
    reader: R,
    writer: Arc<Mutex<W>>,
    db: Arc<dyn AttributeDatabase>,
    mtu: Arc<MtuState>,
    rendezvous: Arc<ConfirmationRendezvous>,
    cancel: CancellationToken,
}

impl<R, W> AttConnection<R, W>
where
    R: ChannelReader,
    W: ChannelWriter + 'static,
{
    pub fn new(
        reader: R,
        writer: W,
        db: Arc<dyn AttributeDatabase>,
        rx_mtu: u16,
        indication_timeout: std::time::Duration,
    ) -> Result<(Self, IndicateSender<W>), ServerError> {
        let mtu = Arc::new(MtuState::new(rx_mtu).map_err(|e| {
            ServerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
        })?);
        let writer = Arc::new(Mutex::new(writer));
        let rendezvous = Arc::new(ConfirmationRendezvous::new());
        let sender = IndicateSender::new(
            writer.clone(),
            mtu.clone(),
            rendezvous.clone(),
            indication_timeout,
        );
        Ok((
            Self {
                reader,
                writer,
                db,
                mtu,
                rendezvous,
                cancel: CancellationToken::new(),
            },
            sender,
        ))
    }

    /// A clone of this connection's shutdown token. Cancelling it from
    /// another task makes `run` return `Ok(())` on its next iteration
    /// instead of waiting for the peer to close the channel - used for
    /// orderly server-wide shutdown, since the transaction loop otherwise
    /// has no way to be interrupted short of the peer disconnecting.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the peer closes the channel, a transport error occurs, or
    /// [`shutdown_handle`](Self::shutdown_handle) is cancelled.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; self.mtu.rx_mtu() as usize];
        loop {
            let n = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("shutdown requested, closing channel");
                    self.rendezvous.close();
                    return Ok(());
                },
                res = self.reader.read_pdu(&mut buf) => match res {
                    Ok(n) => n,
                    Err(err) => {
                        self.rendezvous.close();
                        return Err(err);
                    },
                },
            };
            if n == 0 {
                debug!("peer closed the channel");
                self.rendezvous.close();
                return Ok(());
            }
            let pdu = &buf[..n];

            if pdu.first() == Some(&byte::HANDLE_VALUE_CONFIRMATION) {
                if pdu.len() != 1 {
                    warn!("malformed Handle Value Confirmation, ignoring");
                    continue;
                }
                self.rendezvous.confirm();
                continue;
            }

            let mut out = Vec::new();
            let outcome = dispatch::dispatch(pdu, self.db.as_ref(), &self.mtu, &mut out);
            if matches!(outcome, Outcome::Response) {
                self.writer.lock().await.write_pdu(&out).await?;
            }
        }
    }
}
