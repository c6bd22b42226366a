// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server-initiated notifications and indications (§4.5).
//!
//! Notifications are fire-and-forget. Indications are a tiny sequential
//! sub-protocol: at most one is outstanding at a time, and the server must
//! stop waiting - and may treat the channel as unhealthy - if no
//! confirmation arrives within the configured timeout.
//!
//! Grounded on `client/common.rs`'s `io_with_timeout` pattern for the
//! bounded wait, and on the same single-outstanding-request discipline
//! `client/client.rs`'s `ClientConnection` applies to its own request/
//! response matching, adapted here to a rendezvous instead of a response
//! map since there is only ever one slot.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::{
    att::{handle::Handle, mtu::MtuState, opcode::byte, pdus::encode_handle_value_pdu},
    channel::ChannelWriter,
    error::ServerError,
};

/// The confirmation side of the indicate rendezvous, shared with the
/// transaction loop so it can wake a waiting [`IndicateSender`] when a
/// Handle Value Confirmation (0x1E) arrives.
#[derive(Default)]
pub struct ConfirmationRendezvous {
    notify: Notify,
    waiting: AtomicBool,
    closed: AtomicBool,
}

impl ConfirmationRendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the transaction loop on every inbound Handle Value
    /// Confirmation. A confirmation with nothing waiting for it is
    /// spurious and is dropped, not queued - queuing it would let a stale
    /// confirmation satisfy a future, unrelated indication.
    pub fn confirm(&self) {
        if self.waiting.swap(false, Ordering::AcqRel) {
            self.notify.notify_one();
        } else {
            debug!("dropping confirmation with no outstanding indication");
        }
    }

    /// Called by the transaction loop once, when the channel closes or a
    /// transport error ends it. Wakes a currently blocked indicator (if
    /// any) with a distinguished "closed" outcome instead of letting it
    /// run out its full timeout, and makes every later `indicate` fail
    /// immediately.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if self.waiting.swap(false, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }
}

/// Sends notifications and indications over a shared channel writer.
pub struct IndicateSender<W> {
    writer: Arc<Mutex<W>>,
    mtu: Arc<MtuState>,
    rendezvous: Arc<ConfirmationRendezvous>,
    /// Serializes `indicate` calls: only one indication may be outstanding
    /// at a time (§4.5).
    inflight: Mutex<()>,
    timeout: Duration,
}

impl<W: ChannelWriter> IndicateSender<W> {
    pub fn new(
        writer: Arc<Mutex<W>>,
        mtu: Arc<MtuState>,
        rendezvous: Arc<ConfirmationRendezvous>,
        timeout: Duration,
    ) -> Self {
        Self {
            writer,
            mtu,
            rendezvous,
            inflight: Mutex::new(()),
            timeout,
        }
    }

    /// Send a Handle Value Notification. No acknowledgement is expected.
    pub async fn notify(&self, handle: Handle, value: &[u8]) -> Result<(), ServerError> {
        let mut out = Vec::new();
        encode_handle_value_pdu(
            &mut out,
            byte::HANDLE_VALUE_NOTIFICATION,
            handle,
            value,
            self.mtu.tx_mtu(),
        );
        self.writer.lock().await.write_pdu(&out).await
    }

    /// Send a Handle Value Indication and wait for its confirmation.
    ///
    /// Returns [`ServerError::SeqProtoTimeout`] if no confirmation arrives
    /// within the configured timeout (§4.5, default 30s).
    pub async fn indicate(&self, handle: Handle, value: &[u8]) -> Result<(), ServerError> {
        let _serialize = self.inflight.lock().await;

        if self.rendezvous.closed.load(Ordering::Acquire) {
            return Err(ServerError::ClosedPipe);
        }

        let mut out = Vec::new();
        encode_handle_value_pdu(
            &mut out,
            byte::HANDLE_VALUE_INDICATION,
            handle,
            value,
            self.mtu.tx_mtu(),
        );

        self.rendezvous.waiting.store(true, Ordering::Release);
        self.writer.lock().await.write_pdu(&out).await?;

        match tokio::time::timeout(self.timeout, self.rendezvous.notify.notified()).await {
            Ok(()) if self.rendezvous.closed.load(Ordering::Acquire) => Err(ServerError::ClosedPipe),
            Ok(()) => Ok(()),
            Err(_) => {
                self.rendezvous.waiting.store(false, Ordering::Release);
                warn!(handle, "indication confirmation timed out");
                Err(ServerError::SeqProtoTimeout)
            },
        }
    }
}
