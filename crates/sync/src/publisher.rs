//! The publishing side: owns the head, announces it, and serves head queries
//! and block requests.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use dagsync_network::{IncomingStreams, Multiaddr, PeerId, Stream, Transport, TransportError};
use dagsync_primitives::{AnnounceMessage, ContentId};
use dagsync_store::BlockStore;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::error::PublisherError;
use crate::protocol::blocks::serve_blocks;
use crate::protocol::head::serve_head;
use crate::protocol::{blocks_protocol, head_protocol};
use crate::request::AllowPeer;

#[derive(Clone, Copy, Debug)]
enum Service {
    Head,
    Blocks,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn BlockStore>,
    topic: String,
    head: RwLock<Option<ContentId>>,
    allow_peer: RwLock<Option<AllowPeer>>,
    extra_data: RwLock<Vec<u8>>,
    close_timeout: Duration,
    closed: CancellationToken,
}

impl Inner {
    fn allows(&self, peer_id: &PeerId) -> bool {
        self.allow_peer
            .read()
            .as_ref()
            .map_or(true, |allow| allow(peer_id))
    }

    async fn serve_stream(
        &self,
        service: Service,
        peer_id: PeerId,
        stream: Stream,
    ) -> Result<(), TransportError> {
        match service {
            Service::Head => serve_head(peer_id, stream, || *self.head.read()).await,
            Service::Blocks => serve_blocks(peer_id, stream, &*self.store).await,
        }
    }
}

/// Publishes a DAG head on a gossip topic and serves its blocks.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.inner.topic)
            .field("head", &*self.inner.head.read())
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Starts serving head queries and block requests for `topic`.
    pub async fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn BlockStore>,
        topic: impl Into<String>,
        config: PublisherConfig,
    ) -> Result<Self, PublisherError> {
        let topic = topic.into();

        let head_streams = transport.accept(head_protocol(&topic)?).await?;
        let block_streams = transport.accept(blocks_protocol(&topic)?).await?;

        info!(%topic, peer_id = %transport.local_peer_id(), "Starting publisher");

        let inner = Arc::new(Inner {
            transport,
            store,
            topic,
            head: RwLock::new(None),
            allow_peer: RwLock::new(None),
            extra_data: RwLock::new(config.extra_data),
            close_timeout: config.close_timeout,
            closed: CancellationToken::new(),
        });

        let tasks = vec![
            spawn(serve(Arc::clone(&inner), head_streams, Service::Head)),
            spawn(serve(Arc::clone(&inner), block_streams, Service::Blocks)),
        ];

        Ok(Self {
            inner,
            tasks: Arc::new(Mutex::new(tasks)),
        })
    }

    #[must_use]
    pub fn head(&self) -> Option<ContentId> {
        *self.inner.head.read()
    }

    /// Replaces the head and announces it.
    pub async fn update_root(&self, cid: ContentId) -> Result<(), PublisherError> {
        *self.inner.head.write() = Some(cid);

        info!(topic = %self.inner.topic, head = %cid, "Updated head");

        self.announce(cid).await
    }

    /// Same as [`update_root`](Self::update_root).
    pub async fn set_root(&self, cid: ContentId) -> Result<(), PublisherError> {
        self.update_root(cid).await
    }

    /// Restricts which peers may query the head and fetch blocks.
    ///
    /// Streams from other peers are dropped unanswered. A denied subscriber
    /// never completes a sync: gossip-driven syncs fail quietly in the
    /// background, and an explicit [`Subscriber::sync`](crate::Subscriber::sync)
    /// returns [`SyncError::Transport`](crate::SyncError::Transport), the same
    /// error an unreachable publisher produces.
    pub fn set_allow_peer(&self, allow: Option<AllowPeer>) {
        *self.inner.allow_peer.write() = allow;
    }

    /// Bytes attached to announces from now on.
    pub fn set_extra_data(&self, extra_data: Vec<u8>) {
        *self.inner.extra_data.write() = extra_data;
    }

    async fn announce(&self, cid: ContentId) -> Result<(), PublisherError> {
        let addrs = self
            .inner
            .transport
            .listen_addrs()
            .iter()
            .map(Multiaddr::to_vec)
            .collect();

        let extra_data = self.inner.extra_data.read().clone();

        let data = AnnounceMessage::new(cid)
            .with_addrs(addrs)
            .with_extra_data(extra_data)
            .encode()?;

        self.inner.transport.publish(&self.inner.topic, data).await?;

        Ok(())
    }

    /// Stops serving and waits up to the configured timeout for open streams
    /// to wind down.
    pub async fn close(&self) -> Result<(), PublisherError> {
        self.inner.closed.cancel();

        let tasks = core::mem::take(&mut *self.tasks.lock());

        if tasks.is_empty() {
            return Ok(());
        }

        info!(topic = %self.inner.topic, "Closing publisher");

        let limit = self.inner.close_timeout;

        let results = timeout(limit, join_all(tasks))
            .await
            .map_err(|_| PublisherError::CloseTimeout(limit))?;

        for result in results {
            if let Err(err) = result {
                warn!(%err, "Publisher task failed");
            }
        }

        Ok(())
    }
}

async fn serve(inner: Arc<Inner>, mut incoming: IncomingStreams, service: Service) {
    let mut streams = JoinSet::new();

    loop {
        select! {
            () = inner.closed.cancelled() => break,
            Some(result) = streams.join_next(), if !streams.is_empty() => {
                if let Err(err) = result {
                    warn!(?service, %err, "Stream task failed");
                }
            }
            next = incoming.recv() => {
                let Some((peer_id, stream)) = next else {
                    debug!(?service, "Stopped accepting streams");
                    break;
                };

                if !inner.allows(&peer_id) {
                    debug!(%peer_id, ?service, "Dropping stream from denied peer");
                    drop(stream);
                    continue;
                }

                let inner = Arc::clone(&inner);

                drop(streams.spawn(async move {
                    select! {
                        () = inner.closed.cancelled() => {}
                        result = inner.serve_stream(service, peer_id, stream) => {
                            if let Err(err) = result {
                                debug!(%peer_id, ?service, %err, "Stream ended with error");
                            }
                        }
                    }
                }));
            }
        }
    }

    drop(incoming);

    while let Some(result) = streams.join_next().await {
        if let Err(err) = result {
            warn!(?service, %err, "Stream task failed");
        }
    }
}
