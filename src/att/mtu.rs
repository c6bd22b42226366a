// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! MTU negotiation state (§4.6).
//!
//! `rxMTU` is fixed for the lifetime of the server. `txMTU` starts at the
//! default of 23 and may be upgraded exactly once, by the dispatcher,
//! after an ExchangeMTU response has been fully written. It is stored as
//! an atomic so the notify/indicate senders - which run concurrently with
//! the transaction loop - can read the current value without taking a
//! lock; the dispatcher is the sole writer, matching the "single-writer,
//! many-reader" shape the rest of the session state follows.

use std::sync::atomic::{AtomicU16, Ordering};

use anyhow::{Result, ensure};

/// Default ATT MTU before any ExchangeMTU exchange (Core Spec Vol 3 Part F
/// §3.2.8).
pub const DEFAULT_MTU: u16 = 23;
/// Lower bound for both rxMTU and a client's advertised RxMTU.
pub const MIN_MTU: u16 = 23;
/// Upper bound for any negotiated MTU.
pub const MAX_MTU: u16 = 517;

#[derive(Debug)]
pub struct MtuState {
    rx_mtu: u16,
    tx_mtu: AtomicU16,
}

impl MtuState {
    /// Fails if `rx_mtu` is out of `[MIN_MTU, MAX_MTU]`, matching §6:
    /// "Invalid RxMTU at construction fails server creation."
    pub fn new(rx_mtu: u16) -> Result<Self> {
        ensure!(
            (MIN_MTU..=MAX_MTU).contains(&rx_mtu),
            "rxMTU {rx_mtu} out of bounds [{MIN_MTU}, {MAX_MTU}]"
        );
        Ok(Self {
            rx_mtu,
            tx_mtu: AtomicU16::new(DEFAULT_MTU),
        })
    }

    #[inline]
    pub const fn rx_mtu(&self) -> u16 {
        self.rx_mtu
    }

    #[inline]
    pub fn tx_mtu(&self) -> u16 {
        self.tx_mtu.load(Ordering::Acquire)
    }

    /// Commit a new txMTU. Per §4.3, the caller (the ExchangeMTU handler)
    /// must only call this after the ExchangeMTU response bytes have been
    /// written, and before any other PDU is sent.
    pub fn upgrade_tx_mtu(&self, client_rx_mtu: u16) {
        self.tx_mtu.store(client_rx_mtu, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_bounds_rx_mtu() {
        assert!(MtuState::new(22).is_err());
        assert!(MtuState::new(518).is_err());
    }

    #[test]
    fn default_tx_mtu_is_23() {
        let mtu = MtuState::new(185).expect("valid rxMTU");
        assert_eq!(mtu.tx_mtu(), DEFAULT_MTU);
        assert_eq!(mtu.rx_mtu(), 185);
    }

    #[test]
    fn upgrade_is_observable() {
        let mtu = MtuState::new(185).expect("valid rxMTU");
        mtu.upgrade_tx_mtu(184);
        assert_eq!(mtu.tx_mtu(), 184);
        // rxMTU never changes after construction.
        assert_eq!(mtu.rx_mtu(), 185);
    }
}
