//! grove-p2p
//!
//! libp2p networking layer for Grove nodes.
//!
//! GossipSub broadcasts trxs and blocks to the peers subscribed to each
//! group's channels. Kademlia DHT handles peer discovery and bootstrap.
//! Identify and Ping maintain connection metadata and liveness.

pub mod config;
pub mod message;
pub mod network;

pub use config::P2pConfig;
pub use message::{Channel, GossipPackage, Package};
pub use network::{P2pCommand, P2pHandle, P2pNetwork};
