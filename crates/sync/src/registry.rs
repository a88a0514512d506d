use core::time::Duration;
use std::sync::Arc;

use dagsync_network::PeerId;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::handler::Handler;
use crate::rate_limiter::RateLimiterFactory;

/// Handlers by publisher, created on first use.
pub(crate) struct HandlerRegistry {
    handlers: DashMap<PeerId, Arc<Handler>>,
    rate_limiter: RwLock<Option<RateLimiterFactory>>,
}

impl HandlerRegistry {
    pub(crate) fn new(rate_limiter: Option<RateLimiterFactory>) -> Self {
        Self {
            handlers: DashMap::new(),
            rate_limiter: RwLock::new(rate_limiter),
        }
    }

    /// Applies to handlers created from now on.
    pub(crate) fn set_rate_limiter(&self, factory: Option<RateLimiterFactory>) {
        *self.rate_limiter.write() = factory;
    }

    pub(crate) fn get(&self, peer_id: &PeerId) -> Option<Arc<Handler>> {
        self.handlers.get(peer_id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn get_or_create(&self, peer_id: PeerId) -> Arc<Handler> {
        let entry = self.handlers.entry(peer_id).or_insert_with(|| {
            let limiter = self
                .rate_limiter
                .read()
                .as_ref()
                .and_then(|factory| factory(peer_id));

            debug!(%peer_id, limited = limiter.is_some(), "Created sync handler");

            Arc::new(Handler::new(peer_id, limiter))
        });

        Arc::clone(entry.value())
    }

    /// Returns whether a handler existed.
    pub(crate) fn remove(&self, peer_id: &PeerId) -> bool {
        self.handlers.remove(peer_id).is_some()
    }

    /// Drops handlers idle for longer than `ttl`. Busy handlers are kept.
    pub(crate) fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.handlers.len();

        self.handlers.retain(|peer_id, handler| {
            let keep = handler.is_busy() || handler.idle_for(now) <= ttl;

            if !keep {
                debug!(%peer_id, "Evicted idle sync handler");
            }

            keep
        });

        before.saturating_sub(self.handlers.len())
    }
}
