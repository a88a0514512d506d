//! Point-to-point protocols between a subscriber and a publisher.
//!
//! Both run over framed streams. Protocol ids embed the gossip topic so a
//! peer can publish several independent DAGs.

#[cfg(test)]
#[path = "tests/protocol.rs"]
mod tests;

pub mod blocks;
pub mod head;

use dagsync_network::{StreamProtocol, TransportError};

pub const NAMESPACE: &str = "dagsync";
pub const VERSION: &str = "0.0.1";

/// `/dagsync/head/<topic>/0.0.1`, with empty path segments dropped.
pub fn head_protocol(topic: &str) -> Result<StreamProtocol, TransportError> {
    protocol_id(&join_path(&[NAMESPACE, "head", topic, VERSION]))
}

/// The head protocol id older publishers register: plain concatenation, so
/// topics with leading or doubled slashes keep them.
pub fn legacy_head_protocol(topic: &str) -> Result<StreamProtocol, TransportError> {
    protocol_id(&format!("/{NAMESPACE}/head/{topic}/{VERSION}"))
}

/// `/dagsync/blocks/<topic>/0.0.1`, with empty path segments dropped.
pub fn blocks_protocol(topic: &str) -> Result<StreamProtocol, TransportError> {
    protocol_id(&join_path(&[NAMESPACE, "blocks", topic, VERSION]))
}

fn join_path(parts: &[&str]) -> String {
    let mut path = String::new();

    for segment in parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
    {
        path.push('/');
        path.push_str(segment);
    }

    path
}

fn protocol_id(id: &str) -> Result<StreamProtocol, TransportError> {
    StreamProtocol::try_from_owned(id.to_owned())
        .map_err(|_| TransportError::InvalidProtocol(id.to_owned()))
}
