//! Canonical binary codec for `Block` and `Trx` (spec §4.5): field-tagged
//! bincode, the deterministic-tagged-format substitute for the project's
//! protobuf wire format. Hashing and signing both operate on these bytes
//! with `hash`/`signature` cleared first — see `Block::hashable_bytes` and
//! `Trx::signable_bytes` in `grove-core`.

use grove_core::block::Block;
use grove_core::error::{GroveError, GroveResult};
use grove_core::trx::Trx;
use grove_core::types::Signature;

pub fn encode_block(block: &Block) -> Vec<u8> {
    bincode::serialize(block).expect("block serialization is infallible")
}

pub fn decode_block(bytes: &[u8]) -> GroveResult<Block> {
    bincode::deserialize(bytes).map_err(|e| GroveError::Serialization(e.to_string()))
}

pub fn encode_trx(trx: &Trx) -> Vec<u8> {
    bincode::serialize(trx).expect("trx serialization is infallible")
}

pub fn decode_trx(bytes: &[u8]) -> GroveResult<Trx> {
    bincode::deserialize(bytes).map_err(|e| GroveError::Serialization(e.to_string()))
}

/// Hash a block over its canonical bytes with `hash`/`signature` cleared.
pub fn hash_block(block: &Block) -> grove_core::types::Digest32 {
    grove_crypto::hash(&block.hashable_bytes())
}

/// Sign a block's hash with the producer's secp256k1 secret key.
pub fn sign_block(block: &Block, secret_key_bytes: &[u8]) -> GroveResult<Signature> {
    grove_crypto::sign(secret_key_bytes, &block.hash.0)
        .map_err(|e| GroveError::Other(e.to_string()))
}

/// `IsBlockValid(block, parent)` (spec §4.7 step 4): hash consistency,
/// parent-hash equality, parent-id equality, producer signature.
///
/// Hashes with both `hash` and `signature` zeroed, per DESIGN.md's
/// resolution of the source's clone-then-discard bug (see Open Question #2).
pub fn is_block_valid(block: &Block, parent: &Block) -> GroveResult<()> {
    if hash_block(block) != block.hash {
        return Err(GroveError::HashMismatch);
    }
    if block.prev_hash != parent.hash || block.prev_block_id != parent.block_id {
        return Err(GroveError::HashMismatch);
    }
    grove_crypto::verify(&block.producer_pub_key, &block.hash.0, &block.signature)
        .map_err(|_| GroveError::SignatureMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::types::{BlockId, Digest32, GroupId, SignPublicKey};

    #[test]
    fn round_trip_encode_decode() {
        let block = Block {
            block_id: BlockId::new_v4(),
            group_id: GroupId::new_v4(),
            prev_block_id: BlockId::EMPTY,
            prev_hash: Digest32::ZERO,
            trxs: Vec::new(),
            producer_pub_key: SignPublicKey(vec![1, 2, 3]),
            timestamp: 42,
            hash: Digest32::ZERO,
            signature: Signature(Vec::new()),
        };
        let bytes = encode_block(&block);
        let decoded = decode_block(&bytes).unwrap();
        assert_eq!(decoded.block_id, block.block_id);
    }
}
