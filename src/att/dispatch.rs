// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request dispatcher (§4.3): a pure function of `(opcode, request bytes,
//! db, txMTU)` to response bytes or nothing. One arm per supported opcode;
//! everything else becomes "Request Not Supported". General validation
//! (PDU shape, handle-range sanity) happens before any per-opcode logic,
//! as specified.
//!
//! Secondary grounding for the pagination/truncation algorithms below:
//! `examples/jonas-schievink-rubble/rubble/src/att/server.rs`'s
//! `process_request`, which tracks a `size: Option<usize>` across an
//! enumeration loop to fix the first record's length and then stop at the
//! first mismatch - the same shape this module uses for Read By Type and
//! Read By Group Type.

use crate::{
    att::{
        db::{AttOperation, AttributeDatabase, AttributeValue, ResponseWriter},
        handle::{Handle, HandleRange},
        mtu::MtuState,
        opcode::{AttOpcode, byte},
        pdus::{self, AttRequest, write_u16_le},
    },
    error::AttErrorCode,
    uuid::Uuid,
};

/// Whether `dispatch` wrote a response into `out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Response,
    NoResponse,
}

/// Dispatch one inbound PDU. `out` is the dispatcher's scratch buffer
/// (`txBuf`, §3); the transaction loop writes it to the channel when
/// `Outcome::Response` is returned, and does not touch it otherwise.
///
/// Callers must not pass a Handle Value Confirmation PDU here - the
/// transaction loop demultiplexes it before reaching the dispatcher
/// (§4.4).
pub fn dispatch(
    pdu: &[u8],
    db: &dyn AttributeDatabase,
    mtu: &MtuState,
    out: &mut Vec<u8>,
) -> Outcome {
    let Some(&first) = pdu.first() else {
        pdus::encode_error_response(out, 0, 0, AttErrorCode::InvalidPdu);
        return Outcome::Response;
    };
    let full_op = AttOpcode::from(first).full_byte();

    // Write Command never emits a response, even when malformed or
    // targeting a nonexistent/static attribute (§4.3).
    if full_op == byte::WRITE_COMMAND {
        handle_write_command(pdu, db);
        return Outcome::NoResponse;
    }

    let tx_mtu = mtu.tx_mtu() as usize;

    match pdus::parse(pdu) {
        AttRequest::MalformedPdu => {
            pdus::encode_error_response(out, first, 0, AttErrorCode::InvalidPdu);
        },
        AttRequest::InvalidHandleRange { start } => {
            pdus::encode_error_response(out, first, start, AttErrorCode::InvalidHandle);
        },
        AttRequest::Unsupported => {
            pdus::encode_error_response(out, first, 0, AttErrorCode::RequestNotSupported);
        },
        AttRequest::HandleValueConfirmation => {
            // Defensive: the loop should never route this here.
            return Outcome::NoResponse;
        },
        AttRequest::ExchangeMtu { client_rx_mtu } => {
            dispatch_exchange_mtu(out, mtu, client_rx_mtu, first);
        },
        AttRequest::FindInformation { range } => {
            dispatch_find_information(out, db, tx_mtu, range, first);
        },
        AttRequest::FindByTypeValue { range, attr_type, value } => {
            dispatch_find_by_type_value(out, db, tx_mtu, range, attr_type, value, first);
        },
        AttRequest::ReadByType { range, attr_type } => {
            dispatch_read_by_type(out, db, tx_mtu, range, attr_type, first);
        },
        AttRequest::Read { handle } => {
            dispatch_read(out, db, tx_mtu, handle, first);
        },
        AttRequest::ReadBlob { handle, offset } => {
            dispatch_read_blob(out, db, tx_mtu, handle, offset, first);
        },
        AttRequest::ReadByGroupType { range, group_type } => {
            dispatch_read_by_group_type(out, db, tx_mtu, range, group_type, first);
        },
        AttRequest::Write { handle, value } => {
            dispatch_write(out, db, tx_mtu, handle, value, first);
        },
        AttRequest::WriteCommand { .. } => unreachable!("handled above"),
    }

    Outcome::Response
}

fn dispatch_exchange_mtu(out: &mut Vec<u8>, mtu: &MtuState, client_rx_mtu: u16, req_op: u8) {
    if client_rx_mtu < crate::att::mtu::MIN_MTU {
        pdus::encode_error_response(out, req_op, 0, AttErrorCode::InvalidPdu);
        return;
    }
    pdus::encode_exchange_mtu_response(out, mtu.rx_mtu());
    // Committed only after the response bytes above are fully framed, and
    // before this function returns - the transaction loop writes `out`
    // next, so no other PDU can be emitted in between (§4.3, §4.6).
    mtu.upgrade_tx_mtu(client_rx_mtu);
}

fn dispatch_find_information(
    out: &mut Vec<u8>,
    db: &dyn AttributeDatabase,
    tx_mtu: usize,
    range: HandleRange,
    req_op: u8,
) {
    out.clear();
    out.push(byte::FIND_INFORMATION_RESPONSE);
    out.push(0); // format byte, fixed below once the first record is known
    let cap = tx_mtu.saturating_sub(2);

    let mut format: Option<u8> = None;
    for attr in db.subrange(range) {
        let width = attr.type_.byte_len();
        let this_format = if width == 2 { 0x01 } else { 0x02 };
        match format {
            None => format = Some(this_format),
            Some(f) if f != this_format => break,
            _ => {},
        }
        let record_len = 2 + width;
        if out.len() - 2 + record_len > cap {
            break;
        }
        write_u16_le(out, attr.handle);
        let mut uuid_buf = [0u8; 16];
        attr.type_.write_le(&mut uuid_buf[..width]);
        out.extend_from_slice(&uuid_buf[..width]);
    }

    match format {
        Some(f) if out.len() > 2 => out[1] = f,
        _ => {
            pdus::encode_error_response(out, req_op, range.start, AttErrorCode::AttributeNotFound);
        },
    }
}

fn dispatch_find_by_type_value(
    out: &mut Vec<u8>,
    db: &dyn AttributeDatabase,
    tx_mtu: usize,
    range: HandleRange,
    attr_type: Uuid,
    value: &[u8],
    req_op: u8,
) {
    out.clear();
    out.push(byte::FIND_BY_TYPE_VALUE_RESPONSE);
    let value_cap = tx_mtu.saturating_sub(7);
    let record_cap = tx_mtu.saturating_sub(1);
    let mut scratch = Vec::new();
    let mut any_match = false;

    for attr in db.subrange(range) {
        if attr.type_ != attr_type {
            continue;
        }
        let resolved = match resolve_value_strict(attr, value_cap, &mut scratch) {
            Ok(v) => v,
            Err(_) => {
                pdus::encode_error_response(out, req_op, range.start, AttErrorCode::InvalidHandle);
                return;
            },
        };
        if resolved != value {
            continue;
        }
        let group_end = match &attr.value {
            AttributeValue::Static(_) => attr.ending_handle,
            AttributeValue::Dynamic(_) => attr.handle,
        };
        if out.len() - 1 + 4 > record_cap {
            break;
        }
        write_u16_le(out, attr.handle);
        write_u16_le(out, group_end);
        any_match = true;
    }

    if !any_match {
        pdus::encode_error_response(out, req_op, range.start, AttErrorCode::AttributeNotFound);
    }
}

fn dispatch_read_by_type(
    out: &mut Vec<u8>,
    db: &dyn AttributeDatabase,
    tx_mtu: usize,
    range: HandleRange,
    attr_type: Uuid,
    req_op: u8,
) {
    let value_cap = tx_mtu.saturating_sub(2);
    let mut dlen: Option<usize> = None;
    let mut scratch = Vec::new();
    out.clear();
    out.push(byte::READ_BY_TYPE_RESPONSE);
    out.push(0); // length byte, filled in once dlen is known

    for attr in db.subrange(range) {
        if attr.type_ != attr_type {
            continue;
        }
        let value = match resolve_value(attr, AttOperation::Read { offset: 0 }, value_cap, &mut scratch) {
            Ok(v) => v,
            Err(code) => {
                if dlen.is_none() {
                    pdus::encode_error_response(out, req_op, range.start, code);
                    return;
                }
                // A later match's handler error truncates silently (§4.3).
                break;
            },
        };
        let candidate = 2 + value.len();
        let this_dlen = match dlen {
            None => {
                let d = candidate.min(255).min(value_cap);
                dlen = Some(d);
                d
            },
            Some(d) => d,
        };
        if candidate != this_dlen {
            break;
        }
        if out.len() + this_dlen > tx_mtu {
            break;
        }
        write_u16_le(out, attr.handle);
        out.extend_from_slice(&value[..this_dlen - 2]);
    }

    match dlen {
        Some(d) if out.len() > 2 => out[1] = d as u8,
        _ => {
            pdus::encode_error_response(out, req_op, range.start, AttErrorCode::AttributeNotFound);
        },
    }
}

fn dispatch_read_by_group_type(
    out: &mut Vec<u8>,
    db: &dyn AttributeDatabase,
    tx_mtu: usize,
    range: HandleRange,
    group_type: Uuid,
    req_op: u8,
) {
    let value_cap = tx_mtu.saturating_sub(2);
    let mut dlen: Option<usize> = None;
    let mut scratch = Vec::new();
    out.clear();
    out.push(byte::READ_BY_GROUP_TYPE_RESPONSE);
    out.push(0);

    for attr in db.subrange(range) {
        if attr.type_ != group_type {
            continue;
        }
        let value = match resolve_value(attr, AttOperation::Read { offset: 0 }, value_cap, &mut scratch) {
            Ok(v) => v,
            Err(code) => {
                // Unlike Read By Type, any handler error aborts the whole
                // response, discarding earlier records (§4.3, §9 - the
                // documented, intentionally preserved asymmetry).
                pdus::encode_error_response(out, req_op, range.start, code);
                return;
            },
        };
        let candidate = 4 + value.len();
        let this_dlen = match dlen {
            None => {
                let d = candidate.min(255).min(value_cap);
                dlen = Some(d);
                d
            },
            Some(d) => d,
        };
        if candidate != this_dlen {
            break;
        }
        if out.len() + this_dlen > tx_mtu {
            break;
        }
        write_u16_le(out, attr.handle);
        write_u16_le(out, attr.ending_handle);
        out.extend_from_slice(&value[..this_dlen - 4]);
    }

    match dlen {
        Some(d) if out.len() > 2 => out[1] = d as u8,
        _ => {
            pdus::encode_error_response(out, req_op, range.start, AttErrorCode::AttributeNotFound);
        },
    }
}

fn dispatch_read(
    out: &mut Vec<u8>,
    db: &dyn AttributeDatabase,
    tx_mtu: usize,
    handle: Handle,
    req_op: u8,
) {
    let Some(attr) = db.at(handle) else {
        pdus::encode_error_response(out, req_op, handle, AttErrorCode::InvalidHandle);
        return;
    };
    let cap = tx_mtu.saturating_sub(1);
    let mut scratch = Vec::new();
    match resolve_value(attr, AttOperation::Read { offset: 0 }, cap, &mut scratch) {
        Ok(value) => {
            out.clear();
            out.push(byte::READ_RESPONSE);
            out.extend_from_slice(value);
        },
        Err(code) => pdus::encode_error_response(out, req_op, handle, code),
    }
}

fn dispatch_read_blob(
    out: &mut Vec<u8>,
    db: &dyn AttributeDatabase,
    tx_mtu: usize,
    handle: Handle,
    offset: u16,
    req_op: u8,
) {
    let Some(attr) = db.at(handle) else {
        pdus::encode_error_response(out, req_op, handle, AttErrorCode::InvalidHandle);
        return;
    };
    let cap = tx_mtu.saturating_sub(1);
    let mut scratch = Vec::new();
    match resolve_value(attr, AttOperation::Read { offset }, cap, &mut scratch) {
        Ok(value) => {
            out.clear();
            out.push(byte::READ_BLOB_RESPONSE);
            out.extend_from_slice(value);
        },
        Err(code) => pdus::encode_error_response(out, req_op, handle, code),
    }
}

fn dispatch_write(
    out: &mut Vec<u8>,
    db: &dyn AttributeDatabase,
    tx_mtu: usize,
    handle: Handle,
    value: &[u8],
    req_op: u8,
) {
    let Some(attr) = db.at(handle) else {
        pdus::encode_error_response(out, req_op, handle, AttErrorCode::InvalidHandle);
        return;
    };
    match &attr.value {
        AttributeValue::Static(_) => {
            pdus::encode_error_response(out, req_op, handle, AttErrorCode::WriteNotPermitted);
        },
        AttributeValue::Dynamic(handler) => {
            let mut sink = Vec::new();
            let cap = tx_mtu.saturating_sub(1);
            let mut writer = ResponseWriter::new(&mut sink, cap);
            match handler.handle(AttOperation::Write { value }, &mut writer) {
                Ok(()) => pdus::encode_write_response(out),
                Err(code) => pdus::encode_error_response(out, req_op, handle, code),
            }
        },
    }
}

fn handle_write_command(pdu: &[u8], db: &dyn AttributeDatabase) {
    let AttRequest::WriteCommand { handle, value } = pdus::parse(pdu) else {
        return;
    };
    let Some(attr) = db.at(handle) else {
        return;
    };
    if let AttributeValue::Dynamic(handler) = &attr.value {
        let mut sink = Vec::new();
        let mut writer = ResponseWriter::new(&mut sink, 0);
        let _ = handler.handle(AttOperation::Write { value }, &mut writer);
    }
}

/// Resolve an attribute's value for a read-shaped operation, writing a
/// dynamic handler's output into `scratch`. Returns the handler's error
/// code (or a fallback) on failure.
fn resolve_value<'a>(
    attr: &crate::att::db::Attribute,
    op: AttOperation<'_>,
    cap: usize,
    scratch: &'a mut Vec<u8>,
) -> Result<&'a [u8], AttErrorCode> {
    match &attr.value {
        AttributeValue::Static(bytes) => {
            scratch.clear();
            let n = bytes.len().min(cap);
            scratch.extend_from_slice(&bytes[..n]);
            Ok(scratch.as_slice())
        },
        AttributeValue::Dynamic(handler) => {
            let mut writer = ResponseWriter::new(scratch, cap);
            handler.handle(op, &mut writer)?;
            Ok(writer.written())
        },
    }
}

/// Find By Type Value's variant of [`resolve_value`]: an overflowing
/// handler write is treated the same as a handler error (§4.3), unlike
/// every other opcode, where the cap just truncates silently.
fn resolve_value_strict<'a>(
    attr: &crate::att::db::Attribute,
    cap: usize,
    scratch: &'a mut Vec<u8>,
) -> Result<&'a [u8], AttErrorCode> {
    match &attr.value {
        AttributeValue::Static(bytes) => {
            scratch.clear();
            let n = bytes.len().min(cap);
            scratch.extend_from_slice(&bytes[..n]);
            Ok(scratch.as_slice())
        },
        AttributeValue::Dynamic(handler) => {
            let mut writer = ResponseWriter::new(scratch, cap);
            handler.handle(AttOperation::Read { offset: 0 }, &mut writer)?;
            if writer.was_truncated() {
                return Err(AttErrorCode::InvalidHandle);
            }
            Ok(writer.written())
        },
    }
}
