use std::io;

use libp2p::{PeerId, StreamProtocol};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("peer {peer} does not support protocol {protocol}")]
    UnsupportedProtocol {
        peer: PeerId,
        protocol: StreamProtocol,
    },

    #[error("failed to reach peer {peer}: {reason}")]
    Dial { peer: PeerId, reason: String },

    #[error("transport closed")]
    Closed,

    #[error("protocol {0} is already being served")]
    AlreadyRegistered(StreamProtocol),

    #[error("invalid protocol id {0:?}")]
    InvalidProtocol(String),

    #[error("failed to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("stream i/o failed")]
    Io(#[from] io::Error),

    #[error("malformed frame")]
    Codec(#[source] io::Error),
}
