// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use att_server_rs::att::{
    db::StaticDatabase,
    dispatch::{Outcome, dispatch},
    mtu::{DEFAULT_MTU, MAX_MTU, MtuState},
    opcode::byte,
};

fn empty_db() -> StaticDatabase {
    StaticDatabase::new(vec![]).expect("empty db is valid")
}

#[test]
fn exchange_mtu_with_default_is_a_no_op_on_buffer_sizes() {
    let db = empty_db();
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let mut pdu = vec![byte::EXCHANGE_MTU_REQUEST];
    pdu.extend_from_slice(&DEFAULT_MTU.to_le_bytes());

    dispatch(&pdu, &db, &mtu, &mut out);
    assert_eq!(mtu.tx_mtu(), DEFAULT_MTU);
}

#[test]
fn exchange_mtu_with_max_resizes_tx_mtu() {
    let db = empty_db();
    let mtu = MtuState::new(517).expect("valid rxMTU");
    let mut out = Vec::new();

    let mut pdu = vec![byte::EXCHANGE_MTU_REQUEST];
    pdu.extend_from_slice(&MAX_MTU.to_le_bytes());

    let outcome = dispatch(&pdu, &db, &mtu, &mut out);
    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(mtu.tx_mtu(), MAX_MTU);
}

#[test]
fn find_information_over_empty_database_is_attribute_not_found() {
    let db = empty_db();
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let pdu = [byte::FIND_INFORMATION_REQUEST, 0x01, 0x00, 0xFF, 0xFF];
    let outcome = dispatch(&pdu, &db, &mtu, &mut out);

    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(out[0], byte::ERROR_RESPONSE);
    assert_eq!(out[4], 0x0A); // Attribute Not Found
}

#[test]
fn read_request_with_wrong_length_is_invalid_pdu_on_handle_zero() {
    let db = empty_db();
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let pdu = [byte::READ_REQUEST, 0x01]; // missing the high handle byte
    let outcome = dispatch(&pdu, &db, &mtu, &mut out);

    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(out[0], byte::ERROR_RESPONSE);
    assert_eq!(&out[2..4], &[0x00, 0x00]); // handle in error is 0
    assert_eq!(out[4], 0x04); // Invalid PDU
}
