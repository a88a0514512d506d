//! Fan-out of [`SyncFinished`] notifications to local watchers.
//!
//! Each watcher has a mailbox of capacity one. Delivering to a full mailbox
//! waits, which in turn holds up the head-tracking sync doing the delivery.

#[cfg(test)]
#[path = "tests/events.rs"]
mod tests;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use dagsync_network::PeerId;
use dagsync_primitives::ContentId;
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::cancel::SyncCancel;
use crate::error::SyncError;

/// Emitted once per head-tracking sync that fetched at least one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncFinished {
    pub peer_id: PeerId,

    /// The head that was synced.
    pub cid: ContentId,

    /// Every block visited, in visit order, head first.
    pub synced_cids: Vec<ContentId>,
}

#[derive(Debug)]
struct Slot {
    sender: mpsc::Sender<SyncFinished>,
    cancelled: CancellationToken,
}

#[derive(Debug, Default)]
struct State {
    watchers: BTreeMap<u64, Slot>,
    next_id: u64,
    closed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EventBus {
    state: Mutex<State>,
}

/// Stops a watcher. Cheap and never blocks.
#[derive(Clone, Debug)]
pub struct WatchCancel {
    id: u64,
    cancelled: CancellationToken,
    bus: Weak<EventBus>,
}

impl WatchCancel {
    pub fn cancel(&self) {
        self.cancelled.cancel();

        if let Some(bus) = self.bus.upgrade() {
            drop(bus.state.lock().watchers.remove(&self.id));
        }
    }
}

impl EventBus {
    pub(crate) fn watch(self: &Arc<Self>) -> (mpsc::Receiver<SyncFinished>, WatchCancel) {
        let (sender, receiver) = mpsc::channel(1);
        let cancelled = CancellationToken::new();

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);

        if state.closed {
            cancelled.cancel();
        } else {
            drop(state.watchers.insert(
                id,
                Slot {
                    sender,
                    cancelled: cancelled.clone(),
                },
            ));
        }

        let cancel = WatchCancel {
            id,
            cancelled,
            bus: Arc::downgrade(self),
        };

        (receiver, cancel)
    }

    /// Hands `event` to every watcher, waiting on full mailboxes.
    ///
    /// Returns `Cancelled` if the caller gave up while waiting. Subscriber
    /// shutdown ends delivery early but is not an error.
    pub(crate) async fn deliver(
        &self,
        event: &SyncFinished,
        cancel: &SyncCancel,
    ) -> Result<(), SyncError> {
        let watchers: Vec<_> = self
            .state
            .lock()
            .watchers
            .values()
            .map(|slot| (slot.sender.clone(), slot.cancelled.clone()))
            .collect();

        for (sender, cancelled) in watchers {
            select! {
                biased;
                () = cancel.caller().cancelled() => return Err(SyncError::Cancelled),
                () = cancel.closed().cancelled() => return Ok(()),
                () = cancelled.cancelled() => trace!("Watcher cancelled during delivery"),
                permit = sender.reserve() => match permit {
                    Ok(permit) => permit.send(event.clone()),
                    Err(_) => trace!("Watcher dropped its mailbox"),
                },
            }
        }

        Ok(())
    }

    /// Closes every mailbox. Later watchers start out closed.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;

        for slot in core::mem::take(&mut state.watchers).into_values() {
            slot.cancelled.cancel();
        }
    }
}
