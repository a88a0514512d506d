use core::time::Duration;

use dagsync_network::TransportError;
use dagsync_primitives::{cid, CodecError, ContentId};
use dagsync_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("block {0} not found")]
    NotFound(ContentId),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("sync cancelled")]
    Cancelled,

    #[error("publisher has no head")]
    NoHead,

    #[error("malformed content id")]
    Decode(#[from] cid::Error),

    #[error("block store failed")]
    Store(#[source] StoreError),

    #[error("subscriber closed")]
    Closed,

    #[error("traversal from {0} visited no blocks")]
    NothingSynced(ContentId),

    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(cid) => Self::NotFound(cid),
            err => Self::Store(err),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PublisherError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode announce")]
    Codec(#[from] CodecError),

    #[error("serving tasks did not stop within {0:?}")]
    CloseTimeout(Duration),
}
