use core::net::Ipv4Addr;
use core::time::Duration;

use dagsync_primitives::common::serde_duration;
use libp2p::identity::Keypair;
use multiaddr::{Multiaddr, Protocol};
use serde::{Deserialize, Serialize};

/// Default idle connection timeout (30 seconds)
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default gossipsub heartbeat interval (1 second)
pub const DEFAULT_GOSSIP_HEARTBEAT_MS: u64 = 1_000;

/// Default maximum gossip message size (4 MiB), enough for a maximal announce
pub const DEFAULT_GOSSIP_MAX_TRANSMIT_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct NetworkConfig {
    pub identity: Keypair,

    pub swarm: SwarmConfig,
}

impl NetworkConfig {
    #[must_use]
    pub fn new(identity: Keypair) -> Self {
        Self {
            identity,
            swarm: SwarmConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub listen: Vec<Multiaddr>,

    #[serde(rename = "idle_connection_timeout_ms", with = "serde_duration")]
    pub idle_connection_timeout: Duration,

    pub gossipsub: GossipsubConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen: vec![Multiaddr::empty()
                .with(Protocol::Ip4(Ipv4Addr::UNSPECIFIED))
                .with(Protocol::Tcp(0))],
            idle_connection_timeout: Duration::from_secs(DEFAULT_IDLE_CONNECTION_TIMEOUT_SECS),
            gossipsub: GossipsubConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipsubConfig {
    #[serde(rename = "heartbeat_interval_ms", with = "serde_duration")]
    pub heartbeat_interval: Duration,

    pub max_transmit_size: usize,
}

impl Default for GossipsubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(DEFAULT_GOSSIP_HEARTBEAT_MS),
            max_transmit_size: DEFAULT_GOSSIP_MAX_TRANSMIT_SIZE,
        }
    }
}
