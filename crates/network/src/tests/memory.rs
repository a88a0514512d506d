use borsh::{BorshDeserialize, BorshSerialize};
use bytes::Bytes;
use claims::assert_ok;

use super::*;

fn protocol(name: &'static str) -> StreamProtocol {
    StreamProtocol::new(name)
}

#[derive(BorshSerialize, BorshDeserialize, Debug, PartialEq)]
struct Ping {
    seq: u32,
}

#[tokio::test]
async fn test_gossip_reaches_other_subscribers_only() {
    let network = MemoryNetwork::new();
    let a = network.transport();
    let b = network.transport();
    let c = network.transport();

    let mut a_rx = a.subscribe("topic").await.unwrap();
    let mut b_rx = b.subscribe("topic").await.unwrap();
    let mut c_rx = c.subscribe("other").await.unwrap();

    a.publish("topic", b"hello".to_vec()).await.unwrap();

    let message = b_rx.recv().await.unwrap();
    assert_eq!(message.data, b"hello");
    assert_eq!(message.source, a.local_peer_id());

    assert!(a_rx.try_recv().is_err(), "publisher must not hear itself");
    assert!(c_rx.try_recv().is_err(), "other topics must stay quiet");
}

#[tokio::test]
async fn test_publish_without_subscribers_succeeds() {
    let network = MemoryNetwork::new();
    let a = network.transport();

    let _ignored = assert_ok!(a.publish("nobody", vec![1]).await);
}

#[tokio::test]
async fn test_open_stream_exchanges_frames() {
    let network = MemoryNetwork::new();
    let server = network.transport();
    let client = network.transport();

    let mut incoming = server.accept(protocol("/echo/1")).await.unwrap();

    let serve = tokio::spawn(async move {
        let (peer, mut stream) = incoming.recv().await.unwrap();
        let ping: Ping = stream.recv_message().await.unwrap().unwrap();
        stream.send_message(&Ping { seq: ping.seq + 1 }).await.unwrap();
        peer
    });

    let mut stream = client
        .open_stream(server.local_peer_id(), &[], protocol("/echo/1"))
        .await
        .unwrap();

    stream.send_message(&Ping { seq: 41 }).await.unwrap();
    let reply: Option<Ping> = stream.recv_message().await.unwrap();

    assert_eq!(reply, Some(Ping { seq: 42 }));
    assert_eq!(serve.await.unwrap(), client.local_peer_id());
}

#[tokio::test]
async fn test_unregistered_protocol_is_unsupported() {
    let network = MemoryNetwork::new();
    let server = network.transport();
    let client = network.transport();

    let _incoming = server.accept(protocol("/known/1")).await.unwrap();

    let err = client
        .open_stream(server.local_peer_id(), &[], protocol("/unknown/1"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, TransportError::UnsupportedProtocol { peer, .. } if peer == server.local_peer_id()),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_dropped_acceptor_stops_serving() {
    let network = MemoryNetwork::new();
    let server = network.transport();
    let client = network.transport();

    drop(server.accept(protocol("/gone/1")).await.unwrap());

    let err = client
        .open_stream(server.local_peer_id(), &[], protocol("/gone/1"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TransportError::UnsupportedProtocol { .. }),
        "unexpected error: {err:?}"
    );

    let _incoming = assert_ok!(server.accept(protocol("/gone/1")).await);
}

#[tokio::test]
async fn test_accept_twice_is_rejected() {
    let network = MemoryNetwork::new();
    let server = network.transport();

    let _incoming = server.accept(protocol("/once/1")).await.unwrap();

    let err = server.accept(protocol("/once/1")).await.unwrap_err();
    assert!(
        matches!(err, TransportError::AlreadyRegistered(_)),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_dials_record_addresses() {
    let network = MemoryNetwork::new();
    let server = network.transport();
    let client = network.transport();
    let addr: Multiaddr = "/ip4/10.0.0.1/tcp/4001".parse().unwrap();

    let mut incoming = server.accept(protocol("/rec/1")).await.unwrap();

    let mut stream = client
        .open_stream(server.local_peer_id(), &[addr.clone()], protocol("/rec/1"))
        .await
        .unwrap();
    let (_, mut remote) = incoming.recv().await.unwrap();

    stream.send(Bytes::from_static(b"x")).await.unwrap();
    stream.close().await.unwrap();

    assert_eq!(remote.recv().await.unwrap(), Some(Bytes::from_static(b"x")));
    assert_eq!(remote.recv().await.unwrap(), None);

    assert_eq!(
        network.dials(),
        vec![DialRecord {
            from: client.local_peer_id(),
            to: server.local_peer_id(),
            protocol: protocol("/rec/1"),
            addrs: vec![addr],
        }]
    );
}
