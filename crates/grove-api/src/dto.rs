//! JSON-friendly views over the hex/binary core types (spec §6 responses
//! are JSON; `grove-core`'s own types serialize their byte arrays as raw
//! number arrays under plain `serde`, which is correct for bincode but
//! unreadable over HTTP).

use grove_core::block::Block;
use grove_core::membership::{
    AnnounceResult, AnnounceType, ConsensusType, GroupEncryptType, GroupItem, ProducerAction,
    UpsertAction,
};
use grove_core::trx::{Trx, TrxType};
use serde::Serialize;

pub fn consensus_type_name(t: ConsensusType) -> &'static str {
    match t {
        ConsensusType::Poa => "poa",
    }
}

pub fn parse_consensus_type(s: &str) -> Result<ConsensusType, grove_core::error::GroveError> {
    match s {
        "poa" => Ok(ConsensusType::Poa),
        other => Err(grove_core::error::GroveError::UnsupportedConsensusType(other.to_string())),
    }
}

pub fn encrypt_type_name(t: GroupEncryptType) -> &'static str {
    match t {
        GroupEncryptType::Public => "public",
        GroupEncryptType::Private => "private",
    }
}

pub fn parse_encrypt_type(s: &str) -> Result<GroupEncryptType, grove_core::error::GroveError> {
    match s {
        "public" => Ok(GroupEncryptType::Public),
        "private" => Ok(GroupEncryptType::Private),
        other => Err(grove_core::error::GroveError::Validation(format!(
            "unknown encrypt_type: {other}"
        ))),
    }
}

pub fn announce_type_name(t: AnnounceType) -> &'static str {
    match t {
        AnnounceType::User => "user",
        AnnounceType::Producer => "producer",
    }
}

pub fn parse_announce_type(s: &str) -> Result<AnnounceType, grove_core::error::GroveError> {
    match s {
        "user" => Ok(AnnounceType::User),
        "producer" => Ok(AnnounceType::Producer),
        other => Err(grove_core::error::GroveError::Validation(format!(
            "unknown announce_type: {other}"
        ))),
    }
}

pub fn announce_result_name(r: AnnounceResult) -> &'static str {
    match r {
        AnnounceResult::Announced => "announced",
        AnnounceResult::Approved => "approved",
    }
}

pub fn producer_action_name(a: ProducerAction) -> &'static str {
    match a {
        ProducerAction::Add => "add",
        ProducerAction::Remove => "remove",
    }
}

pub fn parse_producer_action(s: &str) -> Result<ProducerAction, grove_core::error::GroveError> {
    match s {
        "add" => Ok(ProducerAction::Add),
        "remove" => Ok(ProducerAction::Remove),
        other => Err(grove_core::error::GroveError::Validation(format!(
            "unknown producer action: {other}"
        ))),
    }
}

pub fn parse_upsert_action(s: &str) -> Result<UpsertAction, grove_core::error::GroveError> {
    match s {
        "add" => Ok(UpsertAction::Add),
        "remove" => Ok(UpsertAction::Remove),
        other => Err(grove_core::error::GroveError::Validation(format!(
            "unknown action: {other}"
        ))),
    }
}

fn trx_type_name(t: TrxType) -> &'static str {
    match t {
        TrxType::Post => "post",
        TrxType::Auth => "auth",
        TrxType::Announce => "announce",
        TrxType::Producer => "producer",
        TrxType::Schema => "schema",
        TrxType::ReqBlockForward => "req_block_forward",
        TrxType::ReqBlockBackward => "req_block_backward",
        TrxType::ReqBlockResp => "req_block_resp",
        TrxType::BlockProduced => "block_produced",
    }
}

#[derive(Debug, Serialize)]
pub struct BlockDto {
    pub block_id: String,
    pub group_id: String,
    pub prev_block_id: String,
    pub trx_ids: Vec<String>,
    pub producer_pub_key: String,
    pub timestamp: i64,
    pub hash: String,
    pub signature: String,
}

impl From<&Block> for BlockDto {
    fn from(b: &Block) -> Self {
        Self {
            block_id: b.block_id.to_hex(),
            group_id: b.group_id.to_string(),
            prev_block_id: b.prev_block_id.to_hex(),
            trx_ids: b.trxs.iter().map(|t| t.trx_id.to_hex()).collect(),
            producer_pub_key: b.producer_pub_key.to_hex(),
            timestamp: b.timestamp,
            hash: b.hash.to_hex(),
            signature: hex::encode(&b.signature.0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrxDto {
    pub trx_id: String,
    pub trx_type: String,
    pub group_id: String,
    pub sender_pub_key: String,
    pub timestamp: i64,
    pub expired: i64,
    pub content_hex: String,
}

impl TrxDto {
    pub fn from_decrypted(trx: &Trx, plain: &[u8]) -> Self {
        Self {
            trx_id: trx.trx_id.to_hex(),
            trx_type: trx_type_name(trx.trx_type).to_string(),
            group_id: trx.group_id.to_string(),
            sender_pub_key: trx.sender_pub_key.to_hex(),
            timestamp: trx.timestamp,
            expired: trx.expired,
            content_hex: hex::encode(plain),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupItemDto {
    pub group_id: String,
    pub group_name: String,
    pub owner_pub_key: String,
    pub user_sign_pub_key: String,
    pub user_encrypt_pub_key: String,
    pub app_key: String,
    pub highest_block_id: String,
    pub highest_height: i64,
    pub consensus_type: &'static str,
    pub encrypt_type: &'static str,
}

impl From<&GroupItem> for GroupItemDto {
    fn from(g: &GroupItem) -> Self {
        Self {
            group_id: g.group_id.to_string(),
            group_name: g.group_name.clone(),
            owner_pub_key: g.owner_pub_key.to_hex(),
            user_sign_pub_key: g.user_sign_pub_key.to_hex(),
            user_encrypt_pub_key: g.user_encrypt_pub_key.to_hex(),
            app_key: g.app_key.clone(),
            highest_block_id: g.highest_block_id.to_hex(),
            highest_height: g.highest_height,
            consensus_type: consensus_type_name(g.consensus_type),
            encrypt_type: encrypt_type_name(g.encrypt_type),
        }
    }
}
