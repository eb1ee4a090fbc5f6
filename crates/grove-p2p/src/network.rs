use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad, noise, ping, tcp, yamux,
    swarm::SwarmEvent,
    Multiaddr, PeerId, Swarm,
};
use libp2p_swarm::NetworkBehaviour;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::message::{Channel, GossipPackage};
use grove_core::types::GroupId;

/// Combined libp2p network behaviour for Grove.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates a
/// `GroveBehaviourEvent` enum with one variant per field.
#[derive(NetworkBehaviour)]
pub struct GroveBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

/// Commands a caller sends to the running `P2pNetwork` event loop. Topic
/// subscriptions are dynamic (spec §6): a node joins a group's channels on
/// create/join and leaves them on leave/delete, rather than subscribing to
/// one fixed topic for the node's lifetime.
#[derive(Debug, Clone)]
pub enum P2pCommand {
    Publish(GossipPackage),
    JoinTopic { group_id: GroupId, channel: Channel },
    LeaveTopic { group_id: GroupId, channel: Channel },
}

/// Application-facing handle returned from `P2pNetwork::new()`.
pub struct P2pHandle {
    pub command_tx: mpsc::Sender<P2pCommand>,
    pub inbound_rx: mpsc::Receiver<GossipPackage>,
    pub local_peer_id: PeerId,
    /// Peers that have identified themselves with a protocol version
    /// matching ours (spec §6 "ONLINE iff at least one peer shares this
    /// node's protocol prefix").
    pub protocol_peers: Arc<RwLock<HashSet<PeerId>>>,
}

impl P2pHandle {
    pub fn protocol_peer_count(&self) -> usize {
        self.protocol_peers.read().unwrap().len()
    }
}

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`.
pub struct P2pNetwork {
    swarm: Swarm<GroveBehaviour>,
    command_rx: mpsc::Receiver<P2pCommand>,
    inbound_tx: mpsc::Sender<GossipPackage>,
    protocol_version: String,
    protocol_peers: Arc<RwLock<HashSet<PeerId>>>,
}

impl P2pNetwork {
    /// Build the network and return `(P2pNetwork, P2pHandle)`.
    pub fn new(
        config: &P2pConfig,
    ) -> Result<(Self, P2pHandle), Box<dyn std::error::Error + Send + Sync>> {
        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let store = kad::store::MemoryStore::new(key.public().to_peer_id());
                let kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);

                let identify = identify::Behaviour::new(identify::Config::new(
                    config.protocol_version.clone(),
                    key.public(),
                ));

                let ping = ping::Behaviour::default();

                Ok(GroveBehaviour { gossipsub, kademlia, identify, ping })
            })?
            .build();

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        for addr_str in &config.bootstrap_peers {
            if let Ok(addr) = addr_str.parse::<Multiaddr>() {
                if let Some(libp2p::multiaddr::Protocol::P2p(peer_id)) = addr.iter().last() {
                    swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                    debug!(peer = %peer_id, "added bootstrap peer");
                }
            }
        }

        let local_peer_id = *swarm.local_peer_id();
        let (command_tx, command_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let protocol_peers = Arc::new(RwLock::new(HashSet::new()));

        let network = P2pNetwork {
            swarm,
            command_rx,
            inbound_tx,
            protocol_version: config.protocol_version.clone(),
            protocol_peers: protocol_peers.clone(),
        };
        let handle = P2pHandle { command_tx, inbound_rx, local_peer_id, protocol_peers };

        Ok((network, handle))
    }

    /// Drive the P2P event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => self.handle_command(cmd),

                event = self.swarm.select_next_some() => {
                    match event {
                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!(addr = %address, "P2P listening on");
                        }
                        SwarmEvent::Behaviour(GroveBehaviourEvent::Gossipsub(
                            gossipsub::Event::Message { message, .. },
                        )) => {
                            match GossipPackage::from_bytes(&message.data) {
                                Ok(pkg) => { let _ = self.inbound_tx.send(pkg).await; }
                                Err(e) => debug!(error = %e, "failed to decode gossip package"),
                            }
                        }
                        SwarmEvent::Behaviour(GroveBehaviourEvent::Identify(
                            identify::Event::Received { peer_id, info, .. },
                        )) => {
                            for addr in info.listen_addrs.clone() {
                                self.swarm
                                    .behaviour_mut()
                                    .kademlia
                                    .add_address(&peer_id, addr);
                            }
                            if info.protocol_version == self.protocol_version {
                                self.protocol_peers.write().unwrap().insert(peer_id);
                            } else {
                                debug!(peer = %peer_id, their = %info.protocol_version, ours = %self.protocol_version, "peer on a different protocol version");
                            }
                        }
                        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                            debug!(peer = %peer_id, "connection established");
                        }
                        SwarmEvent::ConnectionClosed { peer_id, .. } => {
                            debug!(peer = %peer_id, "connection closed");
                            self.protocol_peers.write().unwrap().remove(&peer_id);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: P2pCommand) {
        match cmd {
            P2pCommand::Publish(pkg) => {
                let topic = gossipsub::IdentTopic::new(pkg.channel.topic_name(&pkg.group_id));
                if let Err(e) = self.swarm.behaviour_mut().gossipsub.publish(topic, pkg.to_bytes()) {
                    warn!(error = %e, "gossipsub publish failed");
                }
            }
            P2pCommand::JoinTopic { group_id, channel } => {
                let topic = gossipsub::IdentTopic::new(channel.topic_name(&group_id));
                if let Err(e) = self.swarm.behaviour_mut().gossipsub.subscribe(&topic) {
                    warn!(error = %e, group = %group_id, "gossipsub subscribe failed");
                }
            }
            P2pCommand::LeaveTopic { group_id, channel } => {
                let topic = gossipsub::IdentTopic::new(channel.topic_name(&group_id));
                if let Err(e) = self.swarm.behaviour_mut().gossipsub.unsubscribe(&topic) {
                    warn!(error = %e, group = %group_id, "gossipsub unsubscribe failed");
                }
            }
        }
    }
}
