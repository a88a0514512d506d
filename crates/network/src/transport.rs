use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::stream::Stream;

/// Streams opened by remote peers for one protocol, with the opener's id.
pub type IncomingStreams = mpsc::Receiver<(PeerId, Stream)>;

/// A gossip message as received from the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipMessage {
    pub data: Vec<u8>,

    /// Peer that authored the message, or the forwarding peer when the
    /// message is unsigned.
    pub source: PeerId,
}

/// Peer-to-peer plumbing the sync layer runs on.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn local_peer_id(&self) -> PeerId;

    /// Addresses this peer currently listens on.
    fn listen_addrs(&self) -> Vec<Multiaddr>;

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError>;

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<mpsc::Receiver<GossipMessage>, TransportError>;

    /// Opens a stream to `peer`. Non-empty `addrs` are dialed in preference
    /// to whatever the transport already knows about the peer.
    async fn open_stream(
        &self,
        peer: PeerId,
        addrs: &[Multiaddr],
        protocol: StreamProtocol,
    ) -> Result<Stream, TransportError>;

    /// Starts serving `protocol`. Dropping the receiver stops serving it.
    async fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, TransportError>;
}
