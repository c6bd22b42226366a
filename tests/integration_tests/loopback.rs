// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drives the transaction loop and the indicate sender over a real
//! loopback TCP socket instead of an in-process mock channel.

use std::{sync::Arc, time::Duration};

use att_server_rs::{
    att::db::{Attribute, StaticDatabase},
    channel::{ChannelReader, ChannelWriter, TcpChannel},
    error::ServerError,
    server::AttConnection,
    uuid::Uuid,
};
use tokio::net::TcpListener;

/// Binds a loopback listener and accepts exactly one connection in the
/// background once a client shows up. Returns the address to connect to
/// plus a receiver that resolves once that connection's indicate sender
/// is ready - the caller must connect a client before awaiting it.
fn spawn_server(
    db: Arc<StaticDatabase>,
    indication_timeout: Duration,
) -> (
    impl std::future::Future<Output = String>,
    tokio::sync::oneshot::Receiver<att_server_rs::server::IndicateSender<att_server_rs::channel::TcpChannelWriter>>,
) {
    let (sender_tx, sender_rx) = tokio::sync::oneshot::channel();
    let (addr_tx, addr_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let _ = addr_tx.send(listener.local_addr().expect("local addr").to_string());
        let (stream, _peer) = listener.accept().await.expect("accept connection");
        let (reader, writer) = TcpChannel::from_stream(stream).expect("prepare channel");
        let (conn, sender) = AttConnection::new(reader, writer, db, 185, indication_timeout)
            .expect("valid connection");
        let _ = sender_tx.send(sender);
        let _ = conn.run().await;
    });

    (async move { addr_rx.await.expect("listener bound") }, sender_rx)
}

#[tokio::test]
async fn read_request_round_trips_over_loopback() {
    let db = Arc::new(
        StaticDatabase::new(vec![Attribute::static_value(
            0x0003,
            Uuid::Uuid16(0x2A00),
            &b"Hi"[..],
        )])
        .expect("valid db"),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");

    let server_task = tokio::spawn(async move {
        let (stream, _peer) = listener.accept().await.expect("accept");
        let (reader, writer) = TcpChannel::from_stream(stream).expect("prepare channel");
        let (conn, _sender) =
            AttConnection::new(reader, writer, db, 185, Duration::from_secs(30)).expect("valid connection");
        conn.run().await
    });

    let (mut client_reader, mut client_writer) =
        TcpChannel::connect(&addr.to_string()).await.expect("connect");

    client_writer
        .write_pdu(&[0x0A, 0x03, 0x00])
        .await
        .expect("write read request");

    let mut buf = [0u8; 256];
    let n = client_reader.read_pdu(&mut buf).await.expect("read response");
    assert_eq!(&buf[..n], &[0x0B, b'H', b'i']);

    client_writer.close().await.expect("close channel");
    let result = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server task finishes after client closes");
    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test]
async fn indicate_times_out_without_a_confirming_peer() {
    let db = Arc::new(StaticDatabase::new(vec![]).expect("empty db"));
    let (addr_fut, sender_rx) = spawn_server(db, Duration::from_millis(100));
    let addr = addr_fut.await;

    // Connect but never send a confirmation back.
    let (_client_reader, _client_writer) = TcpChannel::connect(&addr).await.expect("connect");
    let sender = sender_rx.await.expect("server accepted the connection");

    let err = sender
        .indicate(0x0005, &[0xAA])
        .await
        .expect_err("no confirmation ever arrives");
    assert!(matches!(err, ServerError::SeqProtoTimeout));
}
