//! Shared fixtures: a publisher and a subscriber on one memory network.

use core::time::Duration;
use std::sync::Arc;

use dagsync::{BlockHook, Publisher, PublisherConfig, Subscriber, SubscriberConfig};
use dagsync_network::memory::{MemoryNetwork, MemoryTransport};
use dagsync_network::{PeerId, Transport};
use dagsync_primitives::ContentId;
use dagsync_store::{MemoryStore, Node};
use eyre::Result as EyreResult;
use parking_lot::Mutex;

pub const TOPIC: &str = "dagsync/test";

/// How long tests wait for something that must not happen.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Upper bound for things that must happen.
pub const DEADLINE: Duration = Duration::from_secs(5);

pub struct TestEnv {
    pub network: MemoryNetwork,
    pub publisher: Publisher,
    pub publisher_id: PeerId,
    pub publisher_store: MemoryStore,
    pub subscriber: Subscriber,
    pub subscriber_store: MemoryStore,
}

impl TestEnv {
    pub async fn new() -> EyreResult<Self> {
        Self::with_config(SubscriberConfig::default()).await
    }

    pub async fn with_config(config: SubscriberConfig) -> EyreResult<Self> {
        let network = MemoryNetwork::new();

        let (publisher, publisher_id, publisher_store) =
            spawn_publisher(&network.transport()).await?;

        let subscriber_store = MemoryStore::new();
        let subscriber = Subscriber::new(
            Arc::new(network.transport()),
            Arc::new(subscriber_store.clone()),
            TOPIC,
            config,
        )
        .await?;

        Ok(Self {
            network,
            publisher,
            publisher_id,
            publisher_store,
            subscriber,
            subscriber_store,
        })
    }

    /// Stops the subscriber from acting on gossip, so only explicit syncs run.
    pub fn ignore_gossip(&self) {
        self.subscriber
            .set_allow_peer(Some(Arc::new(|_: &PeerId| false)));
    }

    /// Adds `len` blocks on top of the publisher's head and returns them,
    /// newest first. Does not announce.
    pub fn extend(&self, len: usize) -> EyreResult<Vec<ContentId>> {
        chain(&self.publisher_store, len, self.publisher.head())
    }

    pub async fn close(self) -> EyreResult<()> {
        self.subscriber.close().await;
        self.publisher.close().await?;

        Ok(())
    }
}

pub async fn spawn_publisher(
    transport: &MemoryTransport,
) -> EyreResult<(Publisher, PeerId, MemoryStore)> {
    let store = MemoryStore::new();

    let publisher = Publisher::new(
        Arc::new(transport.clone()),
        Arc::new(store.clone()),
        TOPIC,
        PublisherConfig::default(),
    )
    .await?;

    Ok((publisher, transport.local_peer_id(), store))
}

/// Builds a linked list of `len` nodes whose oldest entry links to `parent`.
/// Returns the new ids newest first.
pub fn chain(
    store: &MemoryStore,
    len: usize,
    parent: Option<ContentId>,
) -> EyreResult<Vec<ContentId>> {
    let mut cids = Vec::with_capacity(len);
    let mut parent = parent;

    for i in 0..len {
        let data = format!("block {i} after {parent:?}").into_bytes();
        let node = Node::new(data, parent.into_iter().collect());
        let cid = store.insert_node(&node)?;

        cids.push(cid);
        parent = Some(cid);
    }

    cids.reverse();

    Ok(cids)
}

/// A hook that records every call.
pub fn recording_hook() -> (BlockHook, Arc<Mutex<Vec<(PeerId, ContentId)>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);

    let hook: BlockHook = Arc::new(move |peer_id, cid| sink.lock().push((peer_id, cid)));

    (hook, calls)
}
