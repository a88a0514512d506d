//! The head query protocol against real and legacy publishers.

mod common;

use bytes::Bytes;
use claims::{assert_matches, assert_none};
use common::{chain, spawn_publisher};
use dagsync::protocol::head::{HeadReply, HEAD_PATH};
use dagsync::protocol::{head_protocol, legacy_head_protocol};
use dagsync::{query_head, SyncError};
use dagsync_network::memory::MemoryNetwork;
use dagsync_network::{Transport, TransportError};
use dagsync_primitives::ContentId;
use eyre::Result as EyreResult;
use tokio::spawn;
use tokio::time::sleep;

#[tokio::test]
async fn test_query_head_tracks_publisher() -> EyreResult<()> {
    let network = MemoryNetwork::new();
    let (publisher, publisher_id, store) = spawn_publisher(&network.transport()).await?;
    let client = network.transport();

    let head = query_head(&client, common::TOPIC, publisher_id, &[]).await?;
    assert_none!(head);

    let blocks = chain(&store, 1, None)?;
    publisher.set_root(blocks[0]).await?;

    let head = query_head(&client, common::TOPIC, publisher_id, &[]).await?;
    assert_eq!(head, Some(blocks[0]));
    assert_eq!(publisher.head(), Some(blocks[0]));

    publisher.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_query_head_falls_back_to_legacy_id() -> EyreResult<()> {
    let topic = "/legacy//topic";
    let network = MemoryNetwork::new();

    let legacy = legacy_head_protocol(topic)?;
    assert_ne!(legacy, head_protocol(topic)?);

    let server = network.transport();
    let mut incoming = server.accept(legacy.clone()).await?;

    let head = ContentId::for_block(b"legacy head");

    let task = spawn(async move {
        let Some((_, mut stream)) = incoming.recv().await else {
            return Ok(());
        };

        let _request = stream.recv().await?;
        stream
            .send_message(&HeadReply::Found(head.to_string()))
            .await
    });

    let client = network.transport();
    let found = query_head(&client, topic, server.local_peer_id(), &[]).await?;

    assert_eq!(found, Some(head));
    task.await??;

    let protocols: Vec<_> = network
        .dials()
        .into_iter()
        .map(|dial| dial.protocol)
        .collect();
    assert_eq!(protocols, vec![head_protocol(topic)?, legacy]);

    Ok(())
}

#[tokio::test]
async fn test_query_head_without_server_fails_once() -> EyreResult<()> {
    let network = MemoryNetwork::new();
    let server = network.transport();
    let client = network.transport();

    let result = query_head(&client, common::TOPIC, server.local_peer_id(), &[]).await;

    assert_matches!(
        result,
        Err(SyncError::Transport(TransportError::UnsupportedProtocol { .. }))
    );
    assert_eq!(network.dials().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_query_head_rejects_malformed_head() -> EyreResult<()> {
    let network = MemoryNetwork::new();
    let server = network.transport();
    let mut incoming = server.accept(head_protocol(common::TOPIC)?).await?;

    let task = spawn(async move {
        let Some((_, mut stream)) = incoming.recv().await else {
            return Ok(());
        };

        let _request = stream.recv().await?;
        stream
            .send_message(&HeadReply::Found("not-a-cid".to_owned()))
            .await
    });

    let client = network.transport();
    let result = query_head(&client, common::TOPIC, server.local_peer_id(), &[]).await;

    assert_matches!(result, Err(SyncError::Decode(_)));
    task.await??;

    Ok(())
}

#[tokio::test]
async fn test_head_reply_reflects_root_set_after_stream_opened() -> EyreResult<()> {
    let network = MemoryNetwork::new();
    let (publisher, publisher_id, store) = spawn_publisher(&network.transport()).await?;
    let client = network.transport();

    let mut stream = client
        .open_stream(publisher_id, &[], head_protocol(common::TOPIC)?)
        .await?;

    // Let the publisher pick the stream up before the head moves.
    sleep(common::QUIET_PERIOD).await;

    let blocks = chain(&store, 1, None)?;
    publisher.update_root(blocks[0]).await?;

    stream.send(Bytes::from_static(HEAD_PATH.as_bytes())).await?;
    let reply = stream.recv_message::<HeadReply>().await?;

    assert_eq!(reply, Some(HeadReply::Found(blocks[0].to_string())));

    publisher.close().await?;

    Ok(())
}
