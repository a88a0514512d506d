//! Transport layer for dagsync.
//!
//! The sync layer only talks to the [`Transport`] trait: gossip publish and
//! subscribe, plus framed point-to-point streams keyed by protocol id.
//! [`NetworkManager`] implements it over a libp2p swarm; the in-memory
//! [`MemoryNetwork`](memory::MemoryNetwork) (feature `testing`) implements it
//! within one process.

pub mod config;
pub mod error;
mod manager;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod stream;
pub mod transport;

pub use libp2p::{Multiaddr, PeerId, StreamProtocol};

pub use config::NetworkConfig;
pub use error::TransportError;
pub use manager::{run, NetworkManager};
pub use stream::Stream;
pub use transport::{GossipMessage, IncomingStreams, Transport};
