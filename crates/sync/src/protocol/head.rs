//! Head query: "what is your current head?"
//!
//! The subscriber sends one frame holding the request path, `/head`. The
//! publisher replies with one [`HeadReply`] frame. An empty identifier means
//! the publisher has not set a head yet.

use borsh::{BorshDeserialize, BorshSerialize};
use bytes::Bytes;
use dagsync_network::{Multiaddr, PeerId, Stream, Transport, TransportError};
use dagsync_primitives::ContentId;
use tracing::debug;

use super::{head_protocol, legacy_head_protocol};
use crate::error::SyncError;

pub const HEAD_PATH: &str = "/head";

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum HeadReply {
    Found(String),
    NotFound,
}

/// Asks `peer` for its current head on `topic`.
///
/// Falls back to the legacy protocol id once if the peer does not speak the
/// current one.
pub async fn query_head<T>(
    transport: &T,
    topic: &str,
    peer: PeerId,
    addrs: &[Multiaddr],
) -> Result<Option<ContentId>, SyncError>
where
    T: Transport + ?Sized,
{
    let protocol = head_protocol(topic)?;

    let mut stream = match transport.open_stream(peer, addrs, protocol.clone()).await {
        Ok(stream) => stream,
        Err(err @ TransportError::UnsupportedProtocol { .. }) => {
            let legacy = legacy_head_protocol(topic)?;

            if legacy == protocol {
                return Err(err.into());
            }

            debug!(%peer, %legacy, "Head protocol unsupported, retrying with legacy id");

            transport.open_stream(peer, addrs, legacy).await?
        }
        Err(err) => return Err(err.into()),
    };

    stream.send(Bytes::from_static(HEAD_PATH.as_bytes())).await?;

    let Some(reply) = stream.recv_message::<HeadReply>().await? else {
        return Err(TransportError::Closed.into());
    };

    match reply {
        HeadReply::Found(head) if head.is_empty() => Ok(None),
        HeadReply::Found(head) => Ok(Some(head.parse()?)),
        HeadReply::NotFound => Err(SyncError::Protocol(format!(
            "peer {peer} has no head endpoint"
        ))),
    }
}

/// Answers one head query on `stream`. `head` is read once the request has
/// arrived.
pub(crate) async fn serve_head<F>(
    peer: PeerId,
    mut stream: Stream,
    head: F,
) -> Result<(), TransportError>
where
    F: FnOnce() -> Option<ContentId> + Send,
{
    let Some(request) = stream.recv().await? else {
        return Ok(());
    };

    let reply = if is_head_path(&request) {
        HeadReply::Found(head().map(|cid| cid.to_string()).unwrap_or_default())
    } else {
        debug!(%peer, "Unknown head query path");
        HeadReply::NotFound
    };

    stream.send_message(&reply).await?;
    stream.close().await
}

fn is_head_path(request: &[u8]) -> bool {
    let Ok(path) = core::str::from_utf8(request) else {
        return false;
    };

    path.trim_end_matches('/').rsplit('/').next() == Some("head")
}
