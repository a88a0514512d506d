use core::future::Future;

use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// The two ways a sync can be interrupted: the caller gives up, or the
/// subscriber shuts down.
#[derive(Clone, Debug)]
pub(crate) struct SyncCancel {
    caller: CancellationToken,
    closed: CancellationToken,
}

impl SyncCancel {
    pub(crate) const fn new(caller: CancellationToken, closed: CancellationToken) -> Self {
        Self { caller, closed }
    }

    pub(crate) const fn caller(&self) -> &CancellationToken {
        &self.caller
    }

    pub(crate) const fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Resolves with the matching error once either token fires.
    pub(crate) async fn fired(&self) -> SyncError {
        select! {
            biased;
            () = self.closed.cancelled() => SyncError::Closed,
            () = self.caller.cancelled() => SyncError::Cancelled,
        }
    }

    /// Runs `fut` unless cancellation fires first.
    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        select! {
            biased;
            err = self.fired() => Err(err),
            result = fut => result,
        }
    }
}
