//! Syncs running in parallel, across publishers and against one publisher.

mod common;

use core::time::Duration;
use std::sync::Arc;

use common::{chain, recording_hook, spawn_publisher, TestEnv, DEADLINE, QUIET_PERIOD, TOPIC};
use dagsync::{RateLimitConfig, Subscriber, SubscriberConfig, SyncRequest};
use dagsync_network::memory::MemoryNetwork;
use dagsync_network::PeerId;
use dagsync_store::MemoryStore;
use eyre::Result as EyreResult;
use tokio::spawn;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const PUBLISHERS: usize = 5;
const BLOCKS: usize = 4;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_syncs_from_many_publishers() -> EyreResult<()> {
    let network = MemoryNetwork::new();

    let mut publishers = Vec::with_capacity(PUBLISHERS);
    for _ in 0..PUBLISHERS {
        let (publisher, peer_id, store) = spawn_publisher(&network.transport()).await?;
        let blocks = chain(&store, BLOCKS, None)?;
        publisher.update_root(blocks[0]).await?;
        publishers.push((publisher, peer_id, blocks));
    }

    let subscriber = Subscriber::new(
        Arc::new(network.transport()),
        Arc::new(MemoryStore::new()),
        TOPIC,
        SubscriberConfig::default(),
    )
    .await?;
    subscriber.set_allow_peer(Some(Arc::new(|_: &PeerId| false)));

    let (hook, calls) = recording_hook();
    subscriber.set_block_hook(Some(hook));

    let mut tasks = Vec::with_capacity(PUBLISHERS);
    for (_, peer_id, _) in &publishers {
        let subscriber = subscriber.clone();
        let peer_id = *peer_id;

        tasks.push(spawn(async move {
            subscriber
                .sync(peer_id, SyncRequest::head(), Vec::new(), &CancellationToken::new())
                .await
        }));
    }

    for ((_, peer_id, blocks), task) in publishers.iter().zip(tasks) {
        let synced = timeout(DEADLINE, task).await???;

        assert_eq!(synced, blocks[0]);
        assert_eq!(subscriber.get_latest_sync(peer_id), Some(blocks[0]));
    }

    let calls = calls.lock().clone();
    assert_eq!(calls.len(), PUBLISHERS * BLOCKS);

    for (_, peer_id, blocks) in &publishers {
        let seen: Vec<_> = calls
            .iter()
            .filter(|(from, _)| from == peer_id)
            .map(|(_, cid)| *cid)
            .collect();

        assert_eq!(&seen, blocks);
    }

    subscriber.close().await;
    for (publisher, _, _) in &publishers {
        publisher.close().await?;
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_syncs_to_one_publisher_run_one_at_a_time() -> EyreResult<()> {
    // Slow fetches keep the first sync busy while the second one starts.
    let env = TestEnv::with_config(SubscriberConfig {
        rate_limit: Some(RateLimitConfig {
            interval: Duration::from_millis(50),
            burst: 1,
        }),
        ..SubscriberConfig::default()
    })
    .await?;
    env.ignore_gossip();

    let (hook, calls) = recording_hook();
    env.subscriber.set_block_hook(Some(hook));

    let (mut events, _watch) = env.subscriber.on_sync_finished();

    let blocks = env.extend(BLOCKS)?;
    env.publisher.update_root(blocks[0]).await?;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let subscriber = env.subscriber.clone();
            let peer_id = env.publisher_id;

            spawn(async move {
                subscriber
                    .sync(peer_id, SyncRequest::head(), Vec::new(), &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for task in tasks {
        let synced = timeout(DEADLINE, task).await???;
        assert_eq!(synced, blocks[0]);
    }

    let visited: Vec<_> = calls.lock().iter().map(|(_, cid)| *cid).collect();
    assert_eq!(visited, blocks, "the second sync found nothing new");

    let event = timeout(DEADLINE, events.recv()).await?;
    assert_eq!(event.map(|event| event.cid), Some(blocks[0]));
    assert!(
        timeout(QUIET_PERIOD, events.recv()).await.is_err(),
        "only one sync may report"
    );

    assert_eq!(env.subscriber.get_latest_sync(&env.publisher_id), Some(blocks[0]));

    env.close().await
}
