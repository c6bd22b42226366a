// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Helpers for encoding / decoding the very first byte of every ATT PDU.
//!
//! The byte layout is defined by Bluetooth Core Spec Vol 3 Part F §3.3.1:
//!
//! ```text
//!  7   6   5..0
//! +---+---+---------------+
//! | A | C |  Method (6b)  |  <- first PDU octet
//! +---+---+---------------+
//! ```
//!
//! * **A** - Authentication Signature flag.
//! * **C** - Command flag.
//! * **Method** - 6-bit operation code identifying the PDU type.
//!
//! This server does not support signed writes, so the A flag is decoded for
//! completeness but never changes dispatch; the method value alone selects
//! the handler (§6).

use core::fmt;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Mask selecting the lower 6 bits (method) of the opcode byte.
const METHOD_MASK: u8 = 0b0011_1111;
/// Command flag, bit 6.
const COMMAND_MASK: u8 = 0b0100_0000;
/// Authentication Signature flag, bit 7.
const AUTH_SIG_MASK: u8 = 0b1000_0000;

/// All ATT methods this server recognizes by value, supported or not
/// (§6's opcode table).
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    #[default]
    ErrorResponse = 0x01,
    ExchangeMtuRequest = 0x02,
    ExchangeMtuResponse = 0x03,
    FindInformationRequest = 0x04,
    FindInformationResponse = 0x05,
    FindByTypeValueRequest = 0x06,
    FindByTypeValueResponse = 0x07,
    ReadByTypeRequest = 0x08,
    ReadByTypeResponse = 0x09,
    ReadRequest = 0x0A,
    ReadResponse = 0x0B,
    ReadBlobRequest = 0x0C,
    ReadBlobResponse = 0x0D,
    ReadMultipleRequest = 0x0E,
    ReadMultipleResponse = 0x0F,
    ReadByGroupTypeRequest = 0x10,
    ReadByGroupTypeResponse = 0x11,
    WriteRequest = 0x12,
    WriteResponse = 0x13,
    PrepareWriteRequest = 0x16,
    PrepareWriteResponse = 0x17,
    ExecuteWriteRequest = 0x18,
    ExecuteWriteResponse = 0x19,
    HandleValueNotification = 0x1B,
    HandleValueIndication = 0x1D,
    HandleValueConfirmation = 0x1E,
}

// Note: Write Command (0x52) and Signed Write Command (0xD2) are not
// distinct `Method` values - their low 6 bits equal `WriteRequest`'s. They
// are recognized by matching the full opcode byte (`AttOpcode::full_byte`),
// not the method field alone; see `byte::WRITE_COMMAND` /
// `byte::SIGNED_WRITE_COMMAND` and `dispatch::dispatch`.

impl Method {
    #[inline]
    pub fn from_u6(v: u8) -> Option<Self> {
        Some(match v {
            0x01 => Self::ErrorResponse,
            0x02 => Self::ExchangeMtuRequest,
            0x03 => Self::ExchangeMtuResponse,
            0x04 => Self::FindInformationRequest,
            0x05 => Self::FindInformationResponse,
            0x06 => Self::FindByTypeValueRequest,
            0x07 => Self::FindByTypeValueResponse,
            0x08 => Self::ReadByTypeRequest,
            0x09 => Self::ReadByTypeResponse,
            0x0A => Self::ReadRequest,
            0x0B => Self::ReadResponse,
            0x0C => Self::ReadBlobRequest,
            0x0D => Self::ReadBlobResponse,
            0x0E => Self::ReadMultipleRequest,
            0x0F => Self::ReadMultipleResponse,
            0x10 => Self::ReadByGroupTypeRequest,
            0x11 => Self::ReadByGroupTypeResponse,
            0x12 => Self::WriteRequest,
            0x13 => Self::WriteResponse,
            0x16 => Self::PrepareWriteRequest,
            0x17 => Self::PrepareWriteResponse,
            0x18 => Self::ExecuteWriteRequest,
            0x19 => Self::ExecuteWriteResponse,
            0x1B => Self::HandleValueNotification,
            0x1D => Self::HandleValueIndication,
            0x1E => Self::HandleValueConfirmation,
            _ => return None,
        })
    }
}

/// Returned when the opcode byte's method bits are undefined.
#[derive(Debug, Error)]
#[error("invalid ATT opcode: 0x{0:02x}")]
pub struct UnknownOpcode(pub u8);

/// Typed view of the first PDU octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttOpcode {
    pub auth_signature: bool,
    pub command: bool,
    pub method_raw: u8,
}

impl AttOpcode {
    /// Some opcodes (Write Command, Signed Write Command) are identified
    /// structurally: their method bits collide with other requests once the
    /// Command/Auth-Signature flags are masked off, so the full byte (not
    /// just the method) must be matched. `full_byte` reconstructs it.
    #[inline]
    pub const fn full_byte(&self) -> u8 {
        let mut raw = self.method_raw;
        if self.command {
            raw |= COMMAND_MASK;
        }
        if self.auth_signature {
            raw |= AUTH_SIG_MASK;
        }
        raw
    }
}

impl AttOpcode {
    #[inline]
    const fn from_u8(byte: u8) -> Self {
        Self {
            auth_signature: (byte & AUTH_SIG_MASK) != 0,
            command: (byte & COMMAND_MASK) != 0,
            method_raw: byte & METHOD_MASK,
        }
    }
}

impl From<u8> for AttOpcode {
    fn from(byte: u8) -> Self {
        Self::from_u8(byte)
    }
}

/// Wire-safe, zero-copy opcode octet. Transparent over `u8` so it can sit
/// inside a zerocopy PDU header struct.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawOpcode(u8);

impl RawOpcode {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub const fn decode(&self) -> AttOpcode {
        AttOpcode::from_u8(self.0)
    }
}

impl fmt::Debug for RawOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decoded = self.decode();
        let mut tmp = f.debug_struct("RawOpcode");
        if decoded.auth_signature {
            tmp.field("A", &true);
        }
        if decoded.command {
            tmp.field("C", &true);
        }
        tmp.field("byte", &format_args!("0x{:02x}", self.0)).finish()
    }
}

/// The exact opcode byte values this server writes or recognizes on input,
/// matching §6's table. Kept separate from [`Method`] because several wire
/// values (Write Command vs. Write Request, Signed Write Command vs. Write
/// Request) only differ in the Command/Auth-Signature flag bits folded into
/// the full byte, not the method field alone.
pub mod byte {
    pub const ERROR_RESPONSE: u8 = 0x01;
    pub const EXCHANGE_MTU_REQUEST: u8 = 0x02;
    pub const EXCHANGE_MTU_RESPONSE: u8 = 0x03;
    pub const FIND_INFORMATION_REQUEST: u8 = 0x04;
    pub const FIND_INFORMATION_RESPONSE: u8 = 0x05;
    pub const FIND_BY_TYPE_VALUE_REQUEST: u8 = 0x06;
    pub const FIND_BY_TYPE_VALUE_RESPONSE: u8 = 0x07;
    pub const READ_BY_TYPE_REQUEST: u8 = 0x08;
    pub const READ_BY_TYPE_RESPONSE: u8 = 0x09;
    pub const READ_REQUEST: u8 = 0x0A;
    pub const READ_RESPONSE: u8 = 0x0B;
    pub const READ_BLOB_REQUEST: u8 = 0x0C;
    pub const READ_BLOB_RESPONSE: u8 = 0x0D;
    pub const READ_MULTIPLE_REQUEST: u8 = 0x0E;
    pub const READ_BY_GROUP_TYPE_REQUEST: u8 = 0x10;
    pub const READ_BY_GROUP_TYPE_RESPONSE: u8 = 0x11;
    pub const WRITE_REQUEST: u8 = 0x12;
    pub const WRITE_RESPONSE: u8 = 0x13;
    pub const PREPARE_WRITE_REQUEST: u8 = 0x16;
    pub const EXECUTE_WRITE_REQUEST: u8 = 0x18;
    pub const HANDLE_VALUE_NOTIFICATION: u8 = 0x1B;
    pub const HANDLE_VALUE_INDICATION: u8 = 0x1D;
    pub const HANDLE_VALUE_CONFIRMATION: u8 = 0x1E;
    pub const WRITE_COMMAND: u8 = 0x52;
    pub const SIGNED_WRITE_COMMAND: u8 = 0xD2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_method() {
        let op = AttOpcode::from(byte::READ_REQUEST);
        assert_eq!(op.method_raw, 0x0A);
        assert!(!op.command);
        assert!(!op.auth_signature);
    }

    #[test]
    fn write_command_sets_command_flag() {
        let op = AttOpcode::from(byte::WRITE_COMMAND);
        assert!(op.command);
        assert_eq!(op.full_byte(), byte::WRITE_COMMAND);
    }

    #[test]
    fn signed_write_command_sets_both_flags() {
        let op = AttOpcode::from(byte::SIGNED_WRITE_COMMAND);
        assert!(op.command);
        assert!(op.auth_signature);
        assert_eq!(op.full_byte(), byte::SIGNED_WRITE_COMMAND);
    }

    #[test]
    fn raw_opcode_roundtrip() {
        let raw = RawOpcode::from_raw(byte::HANDLE_VALUE_INDICATION);
        assert_eq!(raw.raw(), byte::HANDLE_VALUE_INDICATION);
    }
}
