use core::fmt;
use std::sync::Arc;

use dagsync_network::PeerId;
use dagsync_primitives::ContentId;
use dagsync_store::Selector;

/// Decides whether a peer may take part. Unset allows everyone.
pub type AllowPeer = Arc<dyn Fn(&PeerId) -> bool + Send + Sync>;

/// Called with the publisher and block id of every visited block.
pub type BlockHook = Arc<dyn Fn(PeerId, ContentId) + Send + Sync>;

/// What a call to [`Subscriber::sync`](crate::Subscriber::sync) fetches.
///
/// Without a selector the whole DAG below the target is explored, down to
/// the configured recursion limit. Either way the peer's latest synced head
/// becomes the stop node unless the selector names one. A hook here replaces
/// the subscriber's general block hook for this call only.
#[derive(Clone)]
pub enum SyncRequest {
    /// Resolve the publisher's head, fetch what is missing, record the head
    /// and notify watchers.
    Head {
        selector: Option<Selector>,
        hook: Option<BlockHook>,
    },

    /// Fetch the DAG below `cid`. The recorded head is left alone and no
    /// notification is sent.
    Scoped {
        cid: ContentId,
        selector: Option<Selector>,
        hook: Option<BlockHook>,
    },
}

impl SyncRequest {
    #[must_use]
    pub const fn head() -> Self {
        Self::Head {
            selector: None,
            hook: None,
        }
    }

    #[must_use]
    pub const fn scoped(cid: ContentId) -> Self {
        Self::Scoped {
            cid,
            selector: None,
            hook: None,
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Selector) -> Self {
        match &mut self {
            Self::Head { selector: slot, .. } | Self::Scoped { selector: slot, .. } => {
                *slot = Some(selector);
            }
        }
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: BlockHook) -> Self {
        match &mut self {
            Self::Head { hook: slot, .. } | Self::Scoped { hook: slot, .. } => {
                *slot = Some(hook);
            }
        }
        self
    }
}

impl fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head { selector, hook } => f
                .debug_struct("Head")
                .field("selector", selector)
                .field("hook", &hook.is_some())
                .finish(),
            Self::Scoped {
                cid,
                selector,
                hook,
            } => f
                .debug_struct("Scoped")
                .field("cid", cid)
                .field("selector", selector)
                .field("hook", &hook.is_some())
                .finish(),
        }
    }
}
