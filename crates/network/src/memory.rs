//! In-process [`Transport`] for tests.
//!
//! Every [`MemoryTransport`] created from the same [`MemoryNetwork`] can
//! gossip with and open streams to the others. Streams are tokio duplex pipes.

#[cfg(test)]
#[path = "tests/memory.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use libp2p::identity::Keypair;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use parking_lot::Mutex;
use tokio::io::duplex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::stream::Stream;
use crate::transport::{GossipMessage, IncomingStreams, Transport};

const GOSSIP_CHANNEL_CAPACITY: usize = 64;
const INCOMING_CHANNEL_CAPACITY: usize = 16;
const PIPE_CAPACITY: usize = 64 * 1024;

/// A stream opened through the memory network, as seen by the dialer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialRecord {
    pub from: PeerId,
    pub to: PeerId,
    pub protocol: StreamProtocol,
    pub addrs: Vec<Multiaddr>,
}

#[derive(Debug, Default)]
struct NetworkState {
    topics: HashMap<String, Vec<(PeerId, mpsc::Sender<GossipMessage>)>>,
    handlers: HashMap<(PeerId, StreamProtocol), mpsc::Sender<(PeerId, Stream)>>,
    dials: Vec<DialRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new peer with a fresh identity and no listen addresses.
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        self.transport_with_addrs(Vec::new())
    }

    #[must_use]
    pub fn transport_with_addrs(&self, listen_addrs: Vec<Multiaddr>) -> MemoryTransport {
        MemoryTransport {
            peer_id: Keypair::generate_ed25519().public().to_peer_id(),
            listen_addrs,
            network: self.clone(),
        }
    }

    /// Every stream opened so far, oldest first.
    #[must_use]
    pub fn dials(&self) -> Vec<DialRecord> {
        self.state.lock().dials.clone()
    }
}

#[derive(Clone, Debug)]
pub struct MemoryTransport {
    peer_id: PeerId,
    listen_addrs: Vec<Multiaddr>,
    network: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.clone()
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError> {
        let subscribers: Vec<_> = {
            let mut state = self.network.state.lock();
            let Some(subscribers) = state.topics.get_mut(topic) else {
                return Ok(());
            };

            subscribers.retain(|(_, sender)| !sender.is_closed());
            subscribers
                .iter()
                .filter(|(peer, _)| *peer != self.peer_id)
                .map(|(_, sender)| sender.clone())
                .collect()
        };

        for sender in subscribers {
            let message = GossipMessage {
                data: data.clone(),
                source: self.peer_id,
            };

            if sender.send(message).await.is_err() {
                debug!(%topic, "Gossip subscriber went away");
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<mpsc::Receiver<GossipMessage>, TransportError> {
        let (sender, receiver) = mpsc::channel(GOSSIP_CHANNEL_CAPACITY);

        self.network
            .state
            .lock()
            .topics
            .entry(topic.to_owned())
            .or_default()
            .push((self.peer_id, sender));

        Ok(receiver)
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        addrs: &[Multiaddr],
        protocol: StreamProtocol,
    ) -> Result<Stream, TransportError> {
        let handler = {
            let mut state = self.network.state.lock();

            state.dials.push(DialRecord {
                from: self.peer_id,
                to: peer,
                protocol: protocol.clone(),
                addrs: addrs.to_vec(),
            });

            state.handlers.get(&(peer, protocol.clone())).cloned()
        };

        let Some(handler) = handler else {
            return Err(TransportError::UnsupportedProtocol { peer, protocol });
        };

        let (local, remote) = duplex(PIPE_CAPACITY);

        if handler.send((self.peer_id, Stream::new(remote))).await.is_err() {
            drop(self.network.state.lock().handlers.remove(&(peer, protocol.clone())));
            return Err(TransportError::UnsupportedProtocol { peer, protocol });
        }

        Ok(Stream::new(local))
    }

    async fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, TransportError> {
        let mut state = self.network.state.lock();
        let key = (self.peer_id, protocol);

        if state.handlers.get(&key).is_some_and(|sender| !sender.is_closed()) {
            return Err(TransportError::AlreadyRegistered(key.1));
        }

        let (sender, receiver) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
        drop(state.handlers.insert(key, sender));

        Ok(receiver)
    }
}
