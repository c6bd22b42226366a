// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PDU codec (§4.1): zero-copy parsing of inbound ATT requests and
//! primitive encoders for outbound responses. Pure and stateless - no
//! allocation happens here beyond what the caller's output buffer already
//! owns; multi-byte integers are little-endian throughout.

use crate::{
    att::{
        handle::{Handle, HandleRange},
        opcode::{AttOpcode, byte},
    },
    error::AttErrorCode,
    uuid::Uuid,
};

#[inline]
fn read_u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

#[inline]
pub fn write_u16_le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// A decoded, still-borrowed inbound request. Variants carrying no data
/// (rejected or response-direction-only opcodes) are collapsed into
/// `Unsupported`.
#[derive(Debug)]
pub enum AttRequest<'a> {
    ExchangeMtu {
        client_rx_mtu: u16,
    },
    FindInformation {
        range: HandleRange,
    },
    FindByTypeValue {
        range: HandleRange,
        attr_type: Uuid,
        value: &'a [u8],
    },
    ReadByType {
        range: HandleRange,
        attr_type: Uuid,
    },
    Read {
        handle: Handle,
    },
    ReadBlob {
        handle: Handle,
        offset: u16,
    },
    ReadByGroupType {
        range: HandleRange,
        group_type: Uuid,
    },
    Write {
        handle: Handle,
        value: &'a [u8],
    },
    WriteCommand {
        handle: Handle,
        value: &'a [u8],
    },
    HandleValueConfirmation,
    /// Read Multiple, Prepare Write, Execute Write, Signed Write Command,
    /// or any unrecognized opcode byte - always rejected with "Request Not
    /// Supported", handle 0 (§4.3).
    Unsupported,
    /// A recognized opcode whose length doesn't match its fixed/variable
    /// shape - rejected with "Invalid PDU", handle 0 (§4.3).
    MalformedPdu,
    /// A correctly-shaped range-scoped request whose StartingHandle is 0 or
    /// exceeds its EndingHandle - a distinct failure class from
    /// `MalformedPdu`, rejected with "Invalid Handle", handle =
    /// StartingHandle (§4.3's "General validation").
    InvalidHandleRange {
        start: Handle,
    },
}

/// Parse the opcode byte and payload of an inbound PDU. Never fails:
/// malformed or unsupported shapes are reported as request variants so the
/// dispatcher can frame the appropriate Error Response uniformly.
pub fn parse(pdu: &[u8]) -> AttRequest<'_> {
    let Some(&first) = pdu.first() else {
        return AttRequest::MalformedPdu;
    };
    let op = AttOpcode::from(first);
    let body = &pdu[1..];

    match op.full_byte() {
        byte::EXCHANGE_MTU_REQUEST => {
            if body.len() != 2 {
                return AttRequest::MalformedPdu;
            }
            AttRequest::ExchangeMtu {
                client_rx_mtu: read_u16_le(body),
            }
        },
        byte::FIND_INFORMATION_REQUEST => match parse_range(body) {
            RangeOutcome::WrongLength => AttRequest::MalformedPdu,
            RangeOutcome::InvalidRange { start } => AttRequest::InvalidHandleRange { start },
            RangeOutcome::Valid(range) => AttRequest::FindInformation { range },
        },
        byte::FIND_BY_TYPE_VALUE_REQUEST => {
            if body.len() < 6 {
                return AttRequest::MalformedPdu;
            }
            match parse_range(&body[0..4]) {
                RangeOutcome::WrongLength => AttRequest::MalformedPdu,
                RangeOutcome::InvalidRange { start } => AttRequest::InvalidHandleRange { start },
                RangeOutcome::Valid(range) => AttRequest::FindByTypeValue {
                    range,
                    attr_type: Uuid::Uuid16(read_u16_le(&body[4..6])),
                    value: &body[6..],
                },
            }
        },
        byte::READ_BY_TYPE_REQUEST => match parse_ranged_type(body) {
            RangedTypeOutcome::WrongLength => AttRequest::MalformedPdu,
            RangedTypeOutcome::InvalidRange { start } => AttRequest::InvalidHandleRange { start },
            RangedTypeOutcome::Valid(range, attr_type) => AttRequest::ReadByType { range, attr_type },
        },
        byte::READ_REQUEST => {
            if body.len() != 2 {
                return AttRequest::MalformedPdu;
            }
            AttRequest::Read {
                handle: read_u16_le(body),
            }
        },
        byte::READ_BLOB_REQUEST => {
            if body.len() != 4 {
                return AttRequest::MalformedPdu;
            }
            AttRequest::ReadBlob {
                handle: read_u16_le(&body[0..2]),
                offset: read_u16_le(&body[2..4]),
            }
        },
        byte::READ_BY_GROUP_TYPE_REQUEST => match parse_ranged_type(body) {
            RangedTypeOutcome::WrongLength => AttRequest::MalformedPdu,
            RangedTypeOutcome::InvalidRange { start } => AttRequest::InvalidHandleRange { start },
            RangedTypeOutcome::Valid(range, group_type) => AttRequest::ReadByGroupType { range, group_type },
        },
        byte::WRITE_REQUEST => match parse_handle_and_value(body) {
            Some((handle, value)) => AttRequest::Write { handle, value },
            None => AttRequest::MalformedPdu,
        },
        byte::WRITE_COMMAND => match parse_handle_and_value(body) {
            Some((handle, value)) => AttRequest::WriteCommand { handle, value },
            None => AttRequest::MalformedPdu,
        },
        byte::HANDLE_VALUE_CONFIRMATION => {
            if !body.is_empty() {
                return AttRequest::MalformedPdu;
            }
            AttRequest::HandleValueConfirmation
        },
        _ => AttRequest::Unsupported,
    }
}

/// Outcome of parsing a 4-byte `[StartingHandle, EndingHandle]` window out
/// of a PDU body. Kept distinct from a bare `Option` so callers can tell a
/// wrong-length PDU ("Invalid PDU") apart from a correctly-shaped but
/// semantically invalid range ("Invalid Handle", §4.3).
enum RangeOutcome {
    WrongLength,
    InvalidRange { start: Handle },
    Valid(HandleRange),
}

fn parse_range(body: &[u8]) -> RangeOutcome {
    if body.len() != 4 {
        return RangeOutcome::WrongLength;
    }
    let start = read_u16_le(&body[0..2]);
    let end = read_u16_le(&body[2..4]);
    match HandleRange::new(start, end) {
        Some(range) => RangeOutcome::Valid(range),
        None => RangeOutcome::InvalidRange { start },
    }
}

/// [`RangeOutcome`]'s counterpart for Read By Type / Read By Group Type
/// requests: a handle range followed by a 2- or 16-byte attribute type,
/// selected by overall PDU length (7 => 16-bit UUID, 21 => 128-bit UUID).
enum RangedTypeOutcome {
    WrongLength,
    InvalidRange { start: Handle },
    Valid(HandleRange, Uuid),
}

fn parse_ranged_type(body: &[u8]) -> RangedTypeOutcome {
    let Some(range_bytes) = body.get(0..4) else {
        return RangedTypeOutcome::WrongLength;
    };
    let range = match parse_range(range_bytes) {
        RangeOutcome::WrongLength => return RangedTypeOutcome::WrongLength,
        RangeOutcome::InvalidRange { start } => return RangedTypeOutcome::InvalidRange { start },
        RangeOutcome::Valid(range) => range,
    };
    let Some(type_) = body.get(4..).and_then(Uuid::from_le_bytes) else {
        return RangedTypeOutcome::WrongLength;
    };
    RangedTypeOutcome::Valid(range, type_)
}

fn parse_handle_and_value(body: &[u8]) -> Option<(Handle, &[u8])> {
    if body.len() < 2 {
        return None;
    }
    Some((read_u16_le(&body[0..2]), &body[2..]))
}

/// Encode a 5-byte Error Response (§4.3 "Error Response framing").
pub fn encode_error_response(
    out: &mut Vec<u8>,
    request_opcode: u8,
    handle_in_error: Handle,
    error: AttErrorCode,
) {
    out.clear();
    out.push(byte::ERROR_RESPONSE);
    out.push(request_opcode);
    write_u16_le(out, handle_in_error);
    out.push(error.wire_value());
}

/// Encode an ExchangeMTU Response (opcode + server rxMTU).
pub fn encode_exchange_mtu_response(out: &mut Vec<u8>, server_rx_mtu: u16) {
    out.clear();
    out.push(byte::EXCHANGE_MTU_RESPONSE);
    write_u16_le(out, server_rx_mtu);
}

/// Encode a 1-byte Write Response.
pub fn encode_write_response(out: &mut Vec<u8>) {
    out.clear();
    out.push(byte::WRITE_RESPONSE);
}

/// Encode a Handle Value Notification or Indication (§4.5). `value` is
/// truncated to fit `tx_mtu` the same way read responses are - the sender,
/// not the codec, is responsible for not handing over more than a peer
/// could ever use.
pub fn encode_handle_value_pdu(out: &mut Vec<u8>, opcode: u8, handle: Handle, value: &[u8], tx_mtu: u16) {
    out.clear();
    out.push(opcode);
    write_u16_le(out, handle);
    let cap = (tx_mtu as usize).saturating_sub(3);
    out.extend_from_slice(&value[..value.len().min(cap)]);
}
