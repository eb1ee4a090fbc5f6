//! Payload shapes carried inside `Trx::data` for the sync request/response
//! trx types (spec §4.6, §4.8). `ProducerItem`/`AnnounceItem`/`DenyUserItem`/
//! `SchemaItem` already live in `grove-core::membership` and are packed
//! as-is; only the block-request exchange needs its own wire shape.

use grove_core::block::Block;
use grove_core::types::{BlockId, SignPublicKey};
use serde::{Deserialize, Serialize};

/// Payload of a `ReqBlockForward`/`ReqBlockBackward` trx.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReqBlockPayload {
    pub block_id: BlockId,
    pub requester_pub_key: SignPublicKey,
    /// Anti-replay nonce, stamped by the Syncer and checked on the matching
    /// response (spec §9 Open Question — requester-pubkey match plus a
    /// per-request nonce).
    pub nonce: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReqBlockResult {
    Found,
    BlockNotFound,
}

/// Payload of a `ReqBlockResp` trx. One response per matched child on a
/// forward request (so a single forward request may fan out into several
/// responses); a single response with `result = BlockNotFound` otherwise.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReqBlockRespPayload {
    pub requester_pub_key: SignPublicKey,
    pub nonce: u64,
    pub result: ReqBlockResult,
    pub block: Option<Block>,
}

/// Payload of a `BlockProduced` trx: the producer announcing a freshly
/// minted block on the producer channel for the other producers to commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockProducedPayload {
    pub block: Block,
}
