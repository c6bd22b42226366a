// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The underlying packet channel (§6), consumed by the server but
//! implemented outside the ATT core proper - in a real BLE stack this is
//! L2CAP. This module defines the split reader/writer contract the
//! transaction loop and senders need, plus a concrete TCP-backed
//! implementation so the crate has a runnable end-to-end path (`main.rs`)
//! and tests can drive a real socket instead of only a mock.
//!
//! Grounded on `client/client.rs`'s split `OwnedReadHalf`/`OwnedWriteHalf`
//! held behind a `tokio::sync::Mutex` each, including the connect-time
//! `set_nodelay`/`set_linger` calls.
//!
//! Raw TCP is a byte stream, not a packet channel - it has no notion of
//! "read returns one whole PDU" the way L2CAP does. `TcpChannel` restores
//! that property with a trivial 2-byte little-endian length prefix on the
//! wire; this framing is outside the ATT protocol itself; it exists only
//! to adapt a byte stream into the packet-channel abstraction §6 assumes.

use std::future::Future;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::error::ServerError;

/// The read half of a packet channel. `read_pdu` returns one whole PDU
/// per call, or `Ok(0)` on orderly teardown.
pub trait ChannelReader: Send {
    fn read_pdu(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, ServerError>> + Send;
}

/// The write half of a packet channel.
pub trait ChannelWriter: Send {
    fn write_pdu(&mut self, bytes: &[u8]) -> impl Future<Output = Result<(), ServerError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), ServerError>> + Send;
}

/// A TCP-backed packet channel using a 2-byte length prefix for framing.
pub struct TcpChannel;

impl TcpChannel {
    /// Connect and split into independently lockable halves, mirroring
    /// `ClientConnection::connect`'s `set_nodelay`/`set_linger` + `into_split`
    /// sequence.
    pub async fn connect(addr: &str) -> Result<(TcpChannelReader, TcpChannelWriter), ServerError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream)?)
    }

    pub fn from_stream(
        stream: TcpStream,
    ) -> Result<(TcpChannelReader, TcpChannelWriter), ServerError> {
        stream.set_linger(None)?;
        stream.set_nodelay(true)?;
        let (r, w) = stream.into_split();
        Ok((TcpChannelReader(r), TcpChannelWriter(w)))
    }
}

pub struct TcpChannelReader(OwnedReadHalf);

impl ChannelReader for TcpChannelReader {
    async fn read_pdu(&mut self, buf: &mut [u8]) -> Result<usize, ServerError> {
        let mut len_prefix = [0u8; 2];
        match self.0.read_exact(&mut len_prefix).await {
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(0),
            Err(e) => return Err(e.into()),
        }
        let len = u16::from_le_bytes(len_prefix) as usize;
        if len > buf.len() {
            return Err(ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("PDU of {len} bytes exceeds receive buffer of {}", buf.len()),
            )));
        }
        self.0.read_exact(&mut buf[..len]).await?;
        Ok(len)
    }
}

pub struct TcpChannelWriter(OwnedWriteHalf);

impl ChannelWriter for TcpChannelWriter {
    async fn write_pdu(&mut self, bytes: &[u8]) -> Result<(), ServerError> {
        let len = u16::try_from(bytes.len()).map_err(|_| {
            ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "PDU too large to frame",
            ))
        })?;
        self.0.write_all(&len.to_le_bytes()).await?;
        self.0.write_all(bytes).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ServerError> {
        self.0.shutdown().await?;
        Ok(())
    }
}
