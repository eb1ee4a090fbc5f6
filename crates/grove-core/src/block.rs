use serde::{Deserialize, Serialize};

use crate::trx::Trx;
use crate::types::{BlockId, Digest32, GroupId, SignPublicKey, Signature, TimestampNanos};

/// An immutable, signed batch of trxs minted by a producer (spec §3).
///
/// `hash` is computed over the serialized block with `hash` and `signature`
/// zeroed (spec §3 invariant; see DESIGN.md Open Question #2 for why this is
/// NOT a literal port of the source's `IsBlockValid` clone-then-discard bug).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub block_id: BlockId,
    pub group_id: GroupId,
    /// Empty (`BlockId::EMPTY`) only for the genesis block.
    pub prev_block_id: BlockId,
    /// `Digest32::ZERO` only for the genesis block.
    pub prev_hash: Digest32,
    pub trxs: Vec<Trx>,
    pub producer_pub_key: SignPublicKey,
    /// Monotonically increasing nanosecond timestamp (spec §3).
    pub timestamp: TimestampNanos,
    pub hash: Digest32,
    pub signature: Signature,
}

impl Block {
    /// Canonical bytes hashed to produce `hash` and signed to produce `signature`:
    /// the full block with `hash` and `signature` zeroed out.
    pub fn hashable_bytes(&self) -> Vec<u8> {
        let mut stripped = self.clone();
        stripped.hash = Digest32::ZERO;
        stripped.signature = Signature(Vec::new());
        bincode::serialize(&stripped).expect("block serialization is infallible")
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_block_id == BlockId::EMPTY && self.trxs.is_empty()
    }
}
