use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::types::{
    BlockId, CipherKey, EncryptPublicKey, GroupId, SignPublicKey, TimestampSecs,
};

/// Only one consensus variant is currently defined (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusType {
    Poa,
}

/// Whether POST payloads are symmetric-group-encrypted or per-recipient (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEncryptType {
    Public,
    Private,
}

/// The persistent descriptor of a group (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupItem {
    pub group_id: GroupId,
    pub group_name: String,
    pub genesis_block: Block,
    pub owner_pub_key: SignPublicKey,
    /// This node's user signing public key within this group.
    pub user_sign_pub_key: SignPublicKey,
    /// This node's user encryption public key within this group.
    pub user_encrypt_pub_key: EncryptPublicKey,
    pub cipher_key: CipherKey,
    pub app_key: String,
    pub highest_block_id: BlockId,
    pub highest_height: i64,
    pub consensus_type: ConsensusType,
    pub encrypt_type: GroupEncryptType,
    pub last_update: TimestampSecs,
}

// ── Membership records ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProducerAction {
    Add,
    Remove,
}

/// A producer registered for a group (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProducerItem {
    pub group_id: GroupId,
    pub producer_pub_key: SignPublicKey,
    pub action: ProducerAction,
    pub blocks_produced: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnounceType {
    User,
    Producer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnounceResult {
    Announced,
    Approved,
}

/// A self-declaration of intent to join as user or producer (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnounceItem {
    pub group_id: GroupId,
    pub announce_type: AnnounceType,
    pub sign_pub_key: SignPublicKey,
    pub encrypt_pub_key: EncryptPublicKey,
    pub result: AnnounceResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertAction {
    Add,
    Remove,
}

/// A blocked-user record (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DenyUserItem {
    pub group_id: GroupId,
    pub user_sign_pub_key: SignPublicKey,
    pub action: UpsertAction,
}

/// Binds a type name to a payload schema (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaItem {
    pub group_id: GroupId,
    pub type_name: String,
    pub schema_json: String,
    pub action: UpsertAction,
}
