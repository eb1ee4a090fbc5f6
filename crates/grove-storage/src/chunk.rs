use grove_core::block::Block;
use grove_core::types::BlockId;
use serde::{Deserialize, Serialize};

/// A stored block plus the chain-graph metadata needed for O(children)
/// traversal without re-walking the whole tree on every lookup.
///
/// Mirrors the original system's block-chunk record: height is fixed at
/// insertion time from the parent's height, and `child_block_ids` is the
/// only field mutated after the fact (appended to when a later block
/// names this one as its parent).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockChunk {
    pub block: Block,
    pub height: i64,
    pub parent_block_id: BlockId,
    pub child_block_ids: Vec<BlockId>,
}

impl BlockChunk {
    pub fn genesis(block: Block) -> Self {
        Self {
            block,
            height: 0,
            parent_block_id: BlockId::EMPTY,
            child_block_ids: Vec::new(),
        }
    }

    pub fn child(block: Block, parent_block_id: BlockId, height: i64) -> Self {
        Self {
            block,
            height,
            parent_block_id,
            child_block_ids: Vec::new(),
        }
    }
}
