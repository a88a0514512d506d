#[cfg(test)]
#[path = "tests/manager.rs"]
mod tests;

use core::fmt;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{eyre, Result as EyreResult};
use futures_util::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, MessageAuthenticity, TopicHash};
use libp2p::swarm::{NetworkBehaviour, Swarm, SwarmEvent};
use libp2p::{identify, noise, ping, tcp, yamux, Multiaddr, PeerId, StreamProtocol, SwarmBuilder};
use libp2p_stream::{Control, OpenStreamError};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::{select, spawn};
use tracing::{debug, info, trace, warn};

use crate::config::NetworkConfig;
use crate::error::TransportError;
use crate::stream::Stream;
use crate::transport::{GossipMessage, IncomingStreams, Transport};

const PROTOCOL_VERSION: &str = concat!("/", env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const GOSSIP_CHANNEL_CAPACITY: usize = 64;
const INCOMING_CHANNEL_CAPACITY: usize = 16;

#[derive(NetworkBehaviour)]
struct Behaviour {
    gossipsub: gossipsub::Behaviour,
    identify: identify::Behaviour,
    ping: ping::Behaviour,
    stream: libp2p_stream::Behaviour,
}

/// [`Transport`] backed by a libp2p swarm running on its own task.
#[derive(Clone)]
pub struct NetworkManager {
    peer_id: PeerId,
    control: Control,
    command_sender: mpsc::Sender<Command>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkManager")
            .field("peer_id", &self.peer_id)
            .field("listen_addrs", &*self.listen_addrs.read())
            .finish_non_exhaustive()
    }
}

/// Builds the swarm, spawns its event loop and starts listening.
pub async fn run(config: &NetworkConfig) -> EyreResult<NetworkManager> {
    let peer_id = config.identity.public().to_peer_id();

    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(config.swarm.gossipsub.heartbeat_interval)
        .max_transmit_size(config.swarm.gossipsub.max_transmit_size)
        .build()
        .map_err(|err| eyre!("invalid gossipsub config: {err:?}"))?;

    let swarm = SwarmBuilder::with_existing_identity(config.identity.clone())
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )?
        .with_behaviour(|key| {
            let gossipsub = gossipsub::Behaviour::new(
                MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )?;

            Ok::<_, Box<dyn core::error::Error + Send + Sync>>(Behaviour {
                gossipsub,
                identify: identify::Behaviour::new(identify::Config::new(
                    PROTOCOL_VERSION.to_owned(),
                    key.public(),
                )),
                ping: ping::Behaviour::default(),
                stream: libp2p_stream::Behaviour::new(),
            })
        })?
        .with_swarm_config(|cfg| {
            cfg.with_idle_connection_timeout(config.swarm.idle_connection_timeout)
        })
        .build();

    let control = swarm.behaviour().stream.new_control();
    let listen_addrs = Arc::new(RwLock::new(Vec::new()));
    let (command_sender, command_receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    let event_loop = EventLoop {
        swarm: Box::new(swarm),
        command_receiver,
        topics: HashMap::new(),
        listen_addrs: Arc::clone(&listen_addrs),
    };

    drop(spawn(event_loop.run()));

    let manager = NetworkManager {
        peer_id,
        control,
        command_sender,
        listen_addrs,
    };

    for addr in &config.swarm.listen {
        manager.listen_on(addr.clone()).await?;
    }

    info!(%peer_id, "Network started");

    Ok(manager)
}

impl NetworkManager {
    pub async fn listen_on(&self, addr: Multiaddr) -> Result<(), TransportError> {
        self.request(|sender| Command::ListenOn { addr, sender })
            .await?
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TransportError> {
        let (sender, receiver) = oneshot::channel();

        self.command_sender
            .send(command(sender))
            .await
            .map_err(|_| TransportError::Closed)?;

        receiver.await.map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for NetworkManager {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.read().clone()
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError> {
        let topic = IdentTopic::new(topic);

        self.request(|sender| Command::Publish {
            topic,
            data,
            sender,
        })
        .await?
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<mpsc::Receiver<GossipMessage>, TransportError> {
        let topic = IdentTopic::new(topic);

        self.request(|sender| Command::Subscribe { topic, sender })
            .await?
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        addrs: &[Multiaddr],
        protocol: StreamProtocol,
    ) -> Result<Stream, TransportError> {
        if !addrs.is_empty() {
            self.command_sender
                .send(Command::AddAddresses {
                    peer,
                    addrs: addrs.to_vec(),
                })
                .await
                .map_err(|_| TransportError::Closed)?;
        }

        let mut control = self.control.clone();

        match control.open_stream(peer, protocol.clone()).await {
            Ok(stream) => Ok(Stream::from_p2p(stream)),
            Err(OpenStreamError::UnsupportedProtocol(_)) => {
                Err(TransportError::UnsupportedProtocol { peer, protocol })
            }
            Err(err) => Err(TransportError::Dial {
                peer,
                reason: err.to_string(),
            }),
        }
    }

    async fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, TransportError> {
        let mut incoming = self
            .control
            .clone()
            .accept(protocol.clone())
            .map_err(|_| TransportError::AlreadyRegistered(protocol.clone()))?;

        let (sender, receiver) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);

        drop(spawn(async move {
            while let Some((peer, stream)) = incoming.next().await {
                if sender.send((peer, Stream::from_p2p(stream))).await.is_err() {
                    break;
                }
            }

            debug!(%protocol, "Stopped accepting streams");
        }));

        Ok(receiver)
    }
}

#[derive(Debug)]
enum Command {
    ListenOn {
        addr: Multiaddr,
        sender: oneshot::Sender<Result<(), TransportError>>,
    },
    Subscribe {
        topic: IdentTopic,
        sender: oneshot::Sender<Result<mpsc::Receiver<GossipMessage>, TransportError>>,
    },
    Publish {
        topic: IdentTopic,
        data: Vec<u8>,
        sender: oneshot::Sender<Result<(), TransportError>>,
    },
    AddAddresses {
        peer: PeerId,
        addrs: Vec<Multiaddr>,
    },
}

struct EventLoop {
    swarm: Box<Swarm<Behaviour>>,
    command_receiver: mpsc::Receiver<Command>,
    topics: HashMap<TopicHash, Vec<mpsc::Sender<GossipMessage>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                command = self.command_receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
            }
        }

        debug!("Network event loop stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ListenOn { addr, sender } => {
                let result = self
                    .swarm
                    .listen_on(addr)
                    .map(drop)
                    .map_err(|err| TransportError::Io(io::Error::other(err)));
                let _ignored = sender.send(result);
            }
            Command::Subscribe { topic, sender } => {
                let result = match self.swarm.behaviour_mut().gossipsub.subscribe(&topic) {
                    Ok(_) => {
                        let (tx, rx) = mpsc::channel(GOSSIP_CHANNEL_CAPACITY);
                        self.topics.entry(topic.hash()).or_default().push(tx);
                        Ok(rx)
                    }
                    Err(err) => Err(TransportError::Publish {
                        topic: topic.to_string(),
                        reason: err.to_string(),
                    }),
                };
                let _ignored = sender.send(result);
            }
            Command::Publish {
                topic,
                data,
                sender,
            } => {
                let _ignored = sender.send(self.publish(&topic, data));
            }
            Command::AddAddresses { peer, addrs } => {
                for addr in addrs {
                    self.swarm.add_peer_address(peer, addr);
                }
            }
        }
    }

    fn publish(&mut self, topic: &IdentTopic, data: Vec<u8>) -> Result<(), TransportError> {
        let hash = topic.hash();
        let gossipsub = &mut self.swarm.behaviour_mut().gossipsub;

        if !gossipsub
            .all_peers()
            .any(|(_, topics)| topics.contains(&&hash))
        {
            debug!(%topic, "No peers subscribed, skipping publish");
            return Ok(());
        }

        match gossipsub.publish(hash, data) {
            Ok(message_id) => {
                trace!(%topic, %message_id, "Published gossip message");
                Ok(())
            }
            Err(err) => Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(BehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                let Some(subscribers) = self.topics.get_mut(&message.topic) else {
                    return;
                };

                let gossip = GossipMessage {
                    data: message.data,
                    source: message.source.unwrap_or(propagation_source),
                };

                subscribers.retain(|sender| match sender.try_send(gossip.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(source = %gossip.source, "Gossip subscriber lagging, dropping message");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "Listening on");
                self.listen_addrs.write().push(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                self.listen_addrs.write().retain(|addr| *addr != address);
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!(%peer_id, "Connection established");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!(?peer_id, %error, "Outgoing connection failed");
            }
            _ => {}
        }
    }
}
