//! The subscribing side: gossip intake, per-publisher handlers and the
//! public sync API.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use dagsync_network::{GossipMessage, Multiaddr, PeerId, Transport};
use dagsync_primitives::{AnnounceMessage, ContentId};
use dagsync_store::BlockStore;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::SyncCancel;
use crate::config::SubscriberConfig;
use crate::error::SyncError;
use crate::events::{EventBus, SyncFinished, WatchCancel};
use crate::handler::Target;
use crate::rate_limiter::{RateLimiter, RateLimiterFactory};
use crate::registry::HandlerRegistry;
use crate::request::{AllowPeer, BlockHook, SyncRequest};

/// State shared by the subscriber, its background tasks and its handlers.
pub(crate) struct Shared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<dyn BlockStore>,
    pub(crate) topic: String,
    pub(crate) recursion_limit: Option<usize>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) registry: HandlerRegistry,
    pub(crate) closed: CancellationToken,
    block_hook: RwLock<Option<BlockHook>>,
    allow_peer: RwLock<Option<AllowPeer>>,
}

impl Shared {
    pub(crate) fn block_hook(&self) -> Option<BlockHook> {
        self.block_hook.read().clone()
    }

    fn allows(&self, peer_id: &PeerId) -> bool {
        self.allow_peer
            .read()
            .as_ref()
            .map_or(true, |allow| allow(peer_id))
    }

    fn announce(self: &Arc<Self>, peer_id: PeerId, cid: ContentId, addrs: Vec<Multiaddr>) {
        let handler = self.registry.get_or_create(peer_id);

        handler.announce(self, cid, addrs);
    }

    fn handle_gossip(self: &Arc<Self>, message: GossipMessage) {
        let announce = match AnnounceMessage::decode(&message.data) {
            Ok(announce) => announce,
            Err(err) => {
                warn!(source = %message.source, %err, "Dropping malformed announce");
                return;
            }
        };

        let publisher = announce
            .orig_peer()
            .and_then(|peer| peer.parse::<PeerId>().ok())
            .unwrap_or(message.source);

        if publisher == self.transport.local_peer_id() {
            return;
        }

        if !self.allows(&publisher) {
            debug!(%publisher, "Ignoring announce from denied publisher");
            return;
        }

        let addrs = announce
            .addrs
            .into_iter()
            .filter_map(|addr| match Multiaddr::try_from(addr) {
                Ok(addr) => Some(addr),
                Err(err) => {
                    debug!(%publisher, %err, "Skipping malformed announce address");
                    None
                }
            })
            .collect();

        debug!(%publisher, head = %announce.head, "Received announce");

        self.announce(publisher, announce.head, addrs);
    }
}

/// Keeps local copies of publishers' DAGs up to date.
///
/// Cloning is cheap; clones share the same handlers and watchers.
#[derive(Clone)]
pub struct Subscriber {
    shared: Arc<Shared>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("topic", &self.shared.topic)
            .field("closed", &self.shared.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Subscriber {
    /// Subscribes to `topic` and starts handling announces.
    pub async fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn BlockStore>,
        topic: impl Into<String>,
        config: SubscriberConfig,
    ) -> Result<Self, SyncError> {
        let topic = topic.into();
        let gossip = transport.subscribe(&topic).await?;

        let rate_limiter = config.rate_limit.map(RateLimiter::per_peer);

        info!(%topic, peer_id = %transport.local_peer_id(), "Starting subscriber");

        let shared = Arc::new(Shared {
            transport,
            store,
            topic,
            recursion_limit: config.recursion_limit,
            events: Arc::new(EventBus::default()),
            registry: HandlerRegistry::new(rate_limiter),
            closed: CancellationToken::new(),
            block_hook: RwLock::new(None),
            allow_peer: RwLock::new(None),
        });

        let mut tasks = vec![spawn(intake(Arc::clone(&shared), gossip))];

        if let (Some(ttl), Some(period)) = (config.idle_handler_ttl, config.sweep_interval()) {
            tasks.push(spawn(sweep(Arc::clone(&shared), ttl, period)));
        }

        Ok(Self {
            shared,
            tasks: Arc::new(Mutex::new(tasks)),
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    /// Hook called for every block visited by syncs that bring no hook of
    /// their own.
    pub fn set_block_hook(&self, hook: Option<BlockHook>) {
        *self.shared.block_hook.write() = hook;
    }

    /// Filters which publishers' announces are acted on.
    pub fn set_allow_peer(&self, allow: Option<AllowPeer>) {
        *self.shared.allow_peer.write() = allow;
    }

    /// Limits block fetches of publishers seen from now on.
    pub fn set_rate_limiter(&self, factory: Option<RateLimiterFactory>) {
        self.shared.registry.set_rate_limiter(factory);
    }

    /// Syncs with `peer_id` and returns the synced root.
    ///
    /// Non-empty `addrs` are used for this call and remembered for later
    /// ones. Cancelling `cancel` abandons the sync with
    /// [`SyncError::Cancelled`].
    pub async fn sync(
        &self,
        peer_id: PeerId,
        request: SyncRequest,
        addrs: Vec<Multiaddr>,
        cancel: &CancellationToken,
    ) -> Result<ContentId, SyncError> {
        if self.shared.closed.is_cancelled() {
            return Err(SyncError::Closed);
        }

        let handler = self.shared.registry.get_or_create(peer_id);
        let cancel = SyncCancel::new(cancel.clone(), self.shared.closed.clone());

        let (target, selector, hook) = match request {
            SyncRequest::Head { selector, hook } => (Target::Head(None), selector, hook),
            SyncRequest::Scoped {
                cid,
                selector,
                hook,
            } => (Target::Scoped(cid), selector, hook),
        };

        handler
            .sync(&self.shared, target, selector, hook, addrs, &cancel)
            .await
    }

    /// Queues a head-tracking sync of `peer_id` to `cid`, as if it had been
    /// announced over gossip.
    pub fn announce(
        &self,
        cid: ContentId,
        peer_id: PeerId,
        addrs: Vec<Multiaddr>,
    ) -> Result<(), SyncError> {
        if self.shared.closed.is_cancelled() {
            return Err(SyncError::Closed);
        }

        self.shared.announce(peer_id, cid, addrs);

        Ok(())
    }

    /// Overrides the recorded sync point without fetching anything.
    pub fn set_latest_sync(&self, peer_id: PeerId, cid: ContentId) {
        self.shared
            .registry
            .get_or_create(peer_id)
            .set_latest_sync(Some(cid));
    }

    #[must_use]
    pub fn get_latest_sync(&self, peer_id: &PeerId) -> Option<ContentId> {
        self.shared
            .registry
            .get(peer_id)
            .and_then(|handler| handler.latest_sync())
    }

    /// Watches completed head-tracking syncs.
    ///
    /// The mailbox holds one event; a watcher that falls behind holds up
    /// further head-tracking syncs.
    #[must_use]
    pub fn on_sync_finished(&self) -> (mpsc::Receiver<SyncFinished>, WatchCancel) {
        self.shared.events.watch()
    }

    /// Forgets everything about `peer_id`. Returns whether anything was known.
    pub fn remove_handler(&self, peer_id: &PeerId) -> bool {
        self.shared.registry.remove(peer_id)
    }

    /// Stops intake, fails in-flight syncs with [`SyncError::Closed`] and
    /// closes every watcher.
    pub async fn close(&self) {
        if !self.shared.closed.is_cancelled() {
            info!(topic = %self.shared.topic, "Closing subscriber");
        }

        self.shared.closed.cancel();
        self.shared.events.close();

        let tasks = core::mem::take(&mut *self.tasks.lock());

        for task in tasks {
            if let Err(err) = task.await {
                warn!(%err, "Subscriber task failed");
            }
        }
    }
}

async fn intake(shared: Arc<Shared>, mut gossip: mpsc::Receiver<GossipMessage>) {
    loop {
        let message = select! {
            () = shared.closed.cancelled() => break,
            message = gossip.recv() => message,
        };

        let Some(message) = message else {
            debug!(topic = %shared.topic, "Gossip subscription ended");
            break;
        };

        shared.handle_gossip(message);
    }
}

async fn sweep(shared: Arc<Shared>, ttl: Duration, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            () = shared.closed.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = shared.registry.evict_idle(ttl);

                if evicted > 0 {
                    debug!(evicted, "Swept idle sync handlers");
                }
            }
        }
    }
}
