use grove_core::block::Block;
use grove_core::trx::Trx;
use grove_core::types::GroupId;
use serde::{Deserialize, Serialize};

/// Which of a group's two gossip channels a package travels on (spec §6
/// "Wire protocol"): `user_channel_<groupId>` carries POSTs and membership
/// trxs, `prod_channel_<groupId>` carries minted blocks and sync traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    User,
    Producer,
}

impl Channel {
    pub fn topic_name(&self, group_id: &GroupId) -> String {
        match self {
            Channel::User => format!(
                "{}{}",
                grove_core::constants::USER_CHANNEL_PREFIX,
                group_id
            ),
            Channel::Producer => format!(
                "{}{}",
                grove_core::constants::PRODUCER_CHANNEL_PREFIX,
                group_id
            ),
        }
    }
}

/// A unit of gossip over a group's channel — either a trx or a minted
/// block (spec §4.6/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Package {
    Trx(Trx),
    Block(Block),
}

/// The envelope actually published to gossipsub: which group and channel
/// this package belongs to, plus the package itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipPackage {
    pub group_id: GroupId,
    pub channel: Channel,
    pub package: Package,
}

impl GossipPackage {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("GossipPackage serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
