//! Per-publisher sync state.
//!
//! A handler serializes traversals against one publisher and remembers how
//! far that publisher's DAG has been synced. Head-tracking syncs also hold the
//! head lock while their event is delivered, so a stalled watcher holds up
//! the next head-tracking sync but never a scoped one.

use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dagsync_network::{Multiaddr, PeerId};
use dagsync_primitives::ContentId;
use dagsync_store::{Selector, Traversal};
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::spawn;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::SyncCancel;
use crate::error::SyncError;
use crate::events::SyncFinished;
use crate::protocol::blocks::RemoteLoader;
use crate::protocol::head::query_head;
use crate::rate_limiter::RateLimiter;
use crate::request::BlockHook;
use crate::subscriber::Shared;

/// Where a sync starts.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Target {
    /// Head-tracking. `None` asks the publisher for its head.
    Head(Option<ContentId>),

    /// Scoped to the given root.
    Scoped(ContentId),
}

#[derive(Debug, Default)]
struct AnnounceQueue {
    next: Option<ContentId>,
    running: bool,
}

#[derive(Debug)]
pub(crate) struct Handler {
    peer_id: PeerId,
    traversal: Mutex<()>,
    head: Mutex<()>,
    latest_sync: RwLock<Option<ContentId>>,
    last_activity: SyncMutex<Instant>,
    in_flight: AtomicUsize,
    addrs: RwLock<Vec<Multiaddr>>,
    limiter: Option<Arc<RateLimiter>>,
    announces: SyncMutex<AnnounceQueue>,
}

/// Marks a handler busy for as long as it lives.
struct Activity<'a> {
    handler: &'a Handler,
}

impl<'a> Activity<'a> {
    fn begin(handler: &'a Handler) -> Self {
        let _prev = handler.in_flight.fetch_add(1, Ordering::AcqRel);
        handler.touch();

        Self { handler }
    }
}

impl Drop for Activity<'_> {
    fn drop(&mut self) {
        self.handler.touch();
        let _prev = self.handler.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Handler {
    pub(crate) fn new(peer_id: PeerId, limiter: Option<Arc<RateLimiter>>) -> Self {
        Self {
            peer_id,
            traversal: Mutex::new(()),
            head: Mutex::new(()),
            latest_sync: RwLock::new(None),
            last_activity: SyncMutex::new(Instant::now()),
            in_flight: AtomicUsize::new(0),
            addrs: RwLock::new(Vec::new()),
            limiter,
            announces: SyncMutex::default(),
        }
    }

    pub(crate) fn latest_sync(&self) -> Option<ContentId> {
        *self.latest_sync.read()
    }

    pub(crate) fn set_latest_sync(&self, cid: Option<ContentId>) {
        *self.latest_sync.write() = cid;
    }

    /// Whether a sync or announce is running or queued.
    pub(crate) fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0 || self.announces.lock().running
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock())
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn resolve_addrs(&self, addrs: Vec<Multiaddr>) -> Vec<Multiaddr> {
        if addrs.is_empty() {
            return self.addrs.read().clone();
        }

        self.addrs.write().clone_from(&addrs);

        addrs
    }

    fn selector(&self, shared: &Shared, selector: Option<Selector>) -> Selector {
        selector
            .unwrap_or_else(|| Selector::explore_all().with_recursion_limit(shared.recursion_limit))
            .or_stop_at(self.latest_sync())
    }

    pub(crate) async fn sync(
        &self,
        shared: &Shared,
        target: Target,
        selector: Option<Selector>,
        hook: Option<BlockHook>,
        addrs: Vec<Multiaddr>,
        cancel: &SyncCancel,
    ) -> Result<ContentId, SyncError> {
        let _activity = Activity::begin(self);

        let addrs = self.resolve_addrs(addrs);
        let hook = hook.or_else(|| shared.block_hook());

        match target {
            Target::Head(announced) => {
                self.sync_head(shared, announced, selector, hook, &addrs, cancel)
                    .await
            }
            Target::Scoped(cid) => {
                self.sync_scoped(shared, cid, selector, hook, &addrs, cancel)
                    .await
            }
        }
    }

    async fn sync_head(
        &self,
        shared: &Shared,
        announced: Option<ContentId>,
        selector: Option<Selector>,
        hook: Option<BlockHook>,
        addrs: &[Multiaddr],
        cancel: &SyncCancel,
    ) -> Result<ContentId, SyncError> {
        let _head_lock = cancel
            .guard(async { Ok(self.head.lock().await) })
            .await?;

        let head = match announced {
            Some(cid) => cid,
            None => cancel
                .guard(query_head(&*shared.transport, &shared.topic, self.peer_id, addrs))
                .await?
                .ok_or(SyncError::NoHead)?,
        };

        let previous = self.latest_sync();

        if previous == Some(head) {
            debug!(peer_id = %self.peer_id, %head, "Head already synced");
            return Ok(head);
        }

        let selector = self.selector(shared, selector);
        let synced_cids = self
            .traverse(shared, head, selector, hook.as_ref(), addrs, cancel)
            .await?;

        if synced_cids.is_empty() {
            return Err(SyncError::NothingSynced(head));
        }

        self.set_latest_sync(Some(head));

        info!(
            peer_id = %self.peer_id,
            %head,
            blocks = synced_cids.len(),
            "Synced head"
        );

        let event = SyncFinished {
            peer_id: self.peer_id,
            cid: head,
            synced_cids,
        };

        if let Err(err) = shared.events.deliver(&event, cancel).await {
            let mut latest = self.latest_sync.write();

            if *latest == Some(head) {
                *latest = previous;
            }

            debug!(peer_id = %self.peer_id, %head, "Sync cancelled during delivery, rolled back");

            return Err(err);
        }

        Ok(head)
    }

    async fn sync_scoped(
        &self,
        shared: &Shared,
        cid: ContentId,
        selector: Option<Selector>,
        hook: Option<BlockHook>,
        addrs: &[Multiaddr],
        cancel: &SyncCancel,
    ) -> Result<ContentId, SyncError> {
        let selector = self.selector(shared, selector);

        let visited = self
            .traverse(shared, cid, selector, hook.as_ref(), addrs, cancel)
            .await?;

        if visited.is_empty() && selector.stop_at() != Some(cid) {
            return Err(SyncError::NothingSynced(cid));
        }

        debug!(peer_id = %self.peer_id, %cid, blocks = visited.len(), "Synced scoped DAG");

        Ok(cid)
    }

    async fn traverse(
        &self,
        shared: &Shared,
        root: ContentId,
        selector: Selector,
        hook: Option<&BlockHook>,
        addrs: &[Multiaddr],
        cancel: &SyncCancel,
    ) -> Result<Vec<ContentId>, SyncError> {
        let _traversal_lock = cancel
            .guard(async { Ok(self.traversal.lock().await) })
            .await?;

        let loader = RemoteLoader::new(
            &*shared.transport,
            &*shared.store,
            &shared.topic,
            self.peer_id,
            addrs,
            self.limiter.clone(),
            cancel,
        );

        let mut traversal = Traversal::new(root, selector);
        let mut visited = Vec::new();

        while let Some(visit) = traversal.next(&loader).await? {
            if let Some(hook) = hook {
                hook(self.peer_id, visit.cid);
            }

            visited.push(visit.cid);
        }

        Ok(visited)
    }

    /// Queues a head-tracking sync to `cid`. A newer announce replaces one
    /// that has not started yet.
    pub(crate) fn announce(
        self: &Arc<Self>,
        shared: &Arc<Shared>,
        cid: ContentId,
        addrs: Vec<Multiaddr>,
    ) {
        if !addrs.is_empty() {
            *self.addrs.write() = addrs;
        }

        let mut queue = self.announces.lock();

        if let Some(replaced) = queue.next.replace(cid) {
            debug!(peer_id = %self.peer_id, %replaced, %cid, "Coalesced pending announce");
        }

        if queue.running {
            return;
        }

        queue.running = true;
        drop(queue);

        let handler = Arc::clone(self);
        let shared = Arc::clone(shared);

        drop(spawn(async move { handler.process_announces(&shared).await }));
    }

    async fn process_announces(&self, shared: &Shared) {
        loop {
            let next = {
                let mut queue = self.announces.lock();
                let next = queue.next.take();
                queue.running = next.is_some();
                next
            };

            let Some(cid) = next else {
                break;
            };

            let cancel = SyncCancel::new(CancellationToken::new(), shared.closed.clone());

            match self
                .sync(shared, Target::Head(Some(cid)), None, None, Vec::new(), &cancel)
                .await
            {
                Ok(_) => {}
                Err(SyncError::Closed) => {
                    self.announces.lock().running = false;
                    break;
                }
                Err(err) => {
                    warn!(peer_id = %self.peer_id, %cid, %err, "Failed to sync announced head");
                }
            }
        }
    }
}
