//! Block exchange: the subscriber asks for blocks by id, one request at a
//! time, over a single stream per traversal.

use std::sync::Arc;

use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use bytes::Bytes;
use dagsync_network::{Multiaddr, PeerId, Stream, Transport, TransportError};
use dagsync_primitives::ContentId;
use dagsync_store::{BlockLoader, BlockStore};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::blocks_protocol;
use crate::cancel::SyncCancel;
use crate::error::SyncError;
use crate::rate_limiter::RateLimiter;

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRequest {
    pub cid: ContentId,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum BlockReply {
    Found(Vec<u8>),
    NotFound,
}

/// Answers block requests on `stream` until the subscriber hangs up.
pub(crate) async fn serve_blocks(
    peer: PeerId,
    mut stream: Stream,
    store: &dyn BlockStore,
) -> Result<(), TransportError> {
    while let Some(BlockRequest { cid }) = stream.recv_message().await? {
        let reply = match store.get(&cid) {
            Ok(Some(data)) => BlockReply::Found(data.to_vec()),
            Ok(None) => BlockReply::NotFound,
            Err(err) => {
                debug!(%peer, %cid, ?err, "Failed to read block");
                BlockReply::NotFound
            }
        };

        stream.send_message(&reply).await?;
    }

    Ok(())
}

/// Loads blocks from the local store, fetching missing ones from the
/// publisher and storing them.
pub(crate) struct RemoteLoader<'a> {
    transport: &'a dyn Transport,
    store: &'a dyn BlockStore,
    topic: &'a str,
    peer: PeerId,
    addrs: &'a [Multiaddr],
    limiter: Option<Arc<RateLimiter>>,
    cancel: &'a SyncCancel,
    stream: Mutex<Option<Stream>>,
}

impl<'a> RemoteLoader<'a> {
    pub(crate) fn new(
        transport: &'a dyn Transport,
        store: &'a dyn BlockStore,
        topic: &'a str,
        peer: PeerId,
        addrs: &'a [Multiaddr],
        limiter: Option<Arc<RateLimiter>>,
        cancel: &'a SyncCancel,
    ) -> Self {
        Self {
            transport,
            store,
            topic,
            peer,
            addrs,
            limiter,
            cancel,
            stream: Mutex::new(None),
        }
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Bytes, SyncError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let mut slot = self.stream.lock().await;

        let stream = match slot.take() {
            Some(stream) => stream,
            None => {
                let protocol = blocks_protocol(self.topic)?;
                self.transport
                    .open_stream(self.peer, self.addrs, protocol)
                    .await?
            }
        };
        let stream = slot.insert(stream);

        stream.send_message(&BlockRequest { cid: *cid }).await?;

        let Some(reply) = stream.recv_message::<BlockReply>().await? else {
            return Err(TransportError::Closed.into());
        };

        let BlockReply::Found(data) = reply else {
            debug!(peer = %self.peer, %cid, "Publisher does not have block");
            return Err(SyncError::NotFound(*cid));
        };

        if !cid.verify(&data) {
            debug!(peer = %self.peer, %cid, "Block does not match its id");
            return Err(SyncError::NotFound(*cid));
        }

        let data = Bytes::from(data);
        self.store.put(*cid, data.clone())?;

        trace!(peer = %self.peer, %cid, len = data.len(), "Fetched block");

        Ok(data)
    }
}

#[async_trait]
impl BlockLoader for RemoteLoader<'_> {
    type Error = SyncError;

    async fn load(&self, cid: &ContentId) -> Result<Bytes, Self::Error> {
        if let Some(data) = self.store.get(cid)? {
            return Ok(data);
        }

        self.cancel.guard(self.fetch(cid)).await
    }
}
