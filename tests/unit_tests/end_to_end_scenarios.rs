// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use att_server_rs::{
    att::{
        db::{Attribute, StaticDatabase},
        dispatch::{Outcome, dispatch},
        mtu::MtuState,
    },
    uuid::Uuid,
};

use super::load_fixture;

#[test]
fn mtu_exchange() {
    let pdu = load_fixture("tests/fixtures/mtu_exchange_request.hex").expect("fixture");
    let db = StaticDatabase::new(vec![]).expect("empty db");
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let outcome = dispatch(&pdu, &db, &mtu, &mut out);
    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(out[0], 0x03);
    assert_eq!(mtu.tx_mtu(), 184);
}

#[test]
fn find_information_two_16_bit_uuids() {
    let pdu = load_fixture("tests/fixtures/find_information_request.hex").expect("fixture");
    let expected = load_fixture("tests/fixtures/find_information_response.hex").expect("fixture");
    let db = StaticDatabase::new(vec![
        Attribute::static_value(0x0001, Uuid::Uuid16(0x2800), &b""[..]),
        Attribute::static_value(0x0002, Uuid::Uuid16(0x2803), &b""[..]),
    ])
    .expect("valid db");
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let outcome = dispatch(&pdu, &db, &mtu, &mut out);
    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(out, expected);
}

#[test]
fn read_static_value() {
    let pdu = load_fixture("tests/fixtures/read_request.hex").expect("fixture");
    let expected = load_fixture("tests/fixtures/read_response.hex").expect("fixture");
    let db = StaticDatabase::new(vec![Attribute::static_value(
        0x0003,
        Uuid::Uuid16(0x2A00),
        &b"Hi"[..],
    )])
    .expect("valid db");
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let outcome = dispatch(&pdu, &db, &mtu, &mut out);
    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(out, expected);
}

#[test]
fn write_to_static_attribute_is_rejected() {
    let pdu = load_fixture("tests/fixtures/write_request.hex").expect("fixture");
    let expected = load_fixture("tests/fixtures/write_not_permitted_response.hex").expect("fixture");
    let db = StaticDatabase::new(vec![Attribute::static_value(
        0x0003,
        Uuid::Uuid16(0x2A00),
        &b"Hi"[..],
    )])
    .expect("valid db");
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let outcome = dispatch(&pdu, &db, &mtu, &mut out);
    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(out, expected);
}

#[test]
fn unsupported_opcode_is_rejected() {
    let pdu = load_fixture("tests/fixtures/unsupported_opcode_request.hex").expect("fixture");
    let expected = load_fixture("tests/fixtures/request_not_supported_response.hex").expect("fixture");
    let db = StaticDatabase::new(vec![]).expect("empty db");
    let mtu = MtuState::new(185).expect("valid rxMTU");
    let mut out = Vec::new();

    let outcome = dispatch(&pdu, &db, &mtu, &mut out);
    assert!(matches!(outcome, Outcome::Response));
    assert_eq!(out, expected);
}

#[test]
fn idempotent_read_returns_identical_bytes() {
    let pdu = load_fixture("tests/fixtures/read_request.hex").expect("fixture");
    let db = StaticDatabase::new(vec![Attribute::static_value(
        0x0003,
        Uuid::Uuid16(0x2A00),
        &b"Hi"[..],
    )])
    .expect("valid db");
    let mtu = MtuState::new(185).expect("valid rxMTU");

    let mut first = Vec::new();
    dispatch(&pdu, &db, &mtu, &mut first);
    let mut second = Vec::new();
    dispatch(&pdu, &db, &mtu, &mut second);

    assert_eq!(first, second);
}
