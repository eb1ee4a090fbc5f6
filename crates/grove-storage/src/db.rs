use std::path::Path;

use grove_core::block::Block;
use grove_core::constants::{
    ANN_PREFIX, ATH_PREFIX, BLK_PREFIX, CHD_PREFIX, CNT_PREFIX, GRP_PREFIX, PRD_PREFIX,
    SMA_PREFIX, TRX_PREFIX,
};
use grove_core::error::{GroveError, GroveResult};
use grove_core::membership::{AnnounceItem, DenyUserItem, GroupItem, ProducerItem, SchemaItem, UpsertAction};
use grove_core::trx::Trx;
use grove_core::types::{BlockId, GroupId, TrxId};
use tracing::debug;

use crate::chunk::BlockChunk;

/// Builds a storage key of the form `<prefix>_<groupId>_<subKey>`, the
/// flat key-prefix scheme spec §4.3 uses over sled's single keyspace.
fn key(prefix: &str, group_id: &GroupId, sub: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(prefix.len() + 1 + group_id.as_str().len() + 1 + sub.len());
    k.extend_from_slice(prefix.as_bytes());
    k.push(b'_');
    k.extend_from_slice(group_id.as_str().as_bytes());
    k.push(b'_');
    k.extend_from_slice(sub);
    k
}

fn storage_err(e: sled::Error) -> GroveError {
    GroveError::Storage(e.to_string())
}

fn ser<T: serde::Serialize>(v: &T) -> GroveResult<Vec<u8>> {
    bincode::serialize(v).map_err(|e| GroveError::Serialization(e.to_string()))
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> GroveResult<T> {
    bincode::deserialize(bytes).map_err(|e| GroveError::Serialization(e.to_string()))
}

/// Persistent storage for group catalogs and per-group chain data, backed by
/// sled. A single `sled::Db` holds all named trees; group-scoped records are
/// disambiguated by the `<prefix>_<groupId>_<subKey>` key convention rather
/// than one tree per group, so opening a node with thousands of groups stays
/// cheap.
pub struct StorageDb {
    _db: sled::Db,
    groups: sled::Tree,
    trxs: sled::Tree,
    blocks: sled::Tree,
    producers: sled::Tree,
    announces: sled::Tree,
    deny_users: sled::Tree,
    schemas: sled::Tree,
    counters: sled::Tree,
    meta: sled::Tree,
    /// Uncommitted blocks gathered ahead of their parent (spec §4.3 "cached
    /// space", entityTag `chd_blk`). Chunks here always carry height = -1
    /// and an empty parent pointer until promoted into `blocks`.
    cache: sled::Tree,
}

impl StorageDb {
    /// Open or create the database at `path`. Returns `StorageLocked` if
    /// another process already holds sled's file lock (spec §6, exit code 16).
    pub fn open<P: AsRef<Path>>(path: P) -> GroveResult<Self> {
        let db = sled::open(path).map_err(|e| match e {
            sled::Error::Io(_) => GroveError::StorageLocked,
            other => GroveError::Storage(other.to_string()),
        })?;
        let groups = db.open_tree(GRP_PREFIX).map_err(storage_err)?;
        let trxs = db.open_tree(TRX_PREFIX).map_err(storage_err)?;
        let blocks = db.open_tree(BLK_PREFIX).map_err(storage_err)?;
        let producers = db.open_tree(PRD_PREFIX).map_err(storage_err)?;
        let announces = db.open_tree(ANN_PREFIX).map_err(storage_err)?;
        let deny_users = db.open_tree(ATH_PREFIX).map_err(storage_err)?;
        let schemas = db.open_tree(SMA_PREFIX).map_err(storage_err)?;
        let counters = db.open_tree(CNT_PREFIX).map_err(storage_err)?;
        let meta = db.open_tree("meta").map_err(storage_err)?;
        let cache = db.open_tree(CHD_PREFIX).map_err(storage_err)?;
        Ok(Self {
            _db: db,
            groups,
            trxs,
            blocks,
            producers,
            announces,
            deny_users,
            schemas,
            counters,
            meta,
            cache,
        })
    }

    pub fn flush(&self) -> GroveResult<()> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }

    // ── Group catalog ────────────────────────────────────────────────────────

    pub fn add_group(&self, item: &GroupItem) -> GroveResult<()> {
        if self.groups.contains_key(item.group_id.as_str()).map_err(storage_err)? {
            return Err(GroveError::GroupAlreadyExists);
        }
        self.groups
            .insert(item.group_id.as_str(), ser(item)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn put_group(&self, item: &GroupItem) -> GroveResult<()> {
        self.groups
            .insert(item.group_id.as_str(), ser(item)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_group(&self, group_id: &GroupId) -> GroveResult<GroupItem> {
        self.groups
            .get(group_id.as_str())
            .map_err(storage_err)?
            .map(|b| de(&b))
            .transpose()?
            .ok_or_else(|| GroveError::GroupNotFound(group_id.to_string()))
    }

    pub fn group_exists(&self, group_id: &GroupId) -> bool {
        self.groups.contains_key(group_id.as_str()).unwrap_or(false)
    }

    pub fn remove_group(&self, group_id: &GroupId) -> GroveResult<()> {
        self.groups.remove(group_id.as_str()).map_err(storage_err)?;
        let scoped = [
            (TRX_PREFIX, &self.trxs),
            (BLK_PREFIX, &self.blocks),
            (PRD_PREFIX, &self.producers),
            (ANN_PREFIX, &self.announces),
            (ATH_PREFIX, &self.deny_users),
            (SMA_PREFIX, &self.schemas),
            (CHD_PREFIX, &self.cache),
        ];
        for (entity_prefix, tree) in scoped {
            let prefix = format!("{}_{}_", entity_prefix, group_id.as_str());
            for item in tree.scan_prefix(prefix.as_bytes()) {
                let (k, _) = item.map_err(storage_err)?;
                tree.remove(k).map_err(storage_err)?;
            }
        }
        // grove-index's content-index entries and highest-block cursor also
        // live under this group id, in the generic meta tree (spec §4.10).
        let meta_prefix = format!("{}_grp-{}_", CNT_PREFIX, group_id.as_str());
        for item in self.meta.scan_prefix(meta_prefix.as_bytes()) {
            let (k, _) = item.map_err(storage_err)?;
            self.meta.remove(k).map_err(storage_err)?;
        }
        Ok(())
    }

    pub fn list_groups(&self) -> GroveResult<Vec<GroupItem>> {
        let mut out = Vec::new();
        for item in self.groups.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    fn block_key(group_id: &GroupId, block_id: &BlockId) -> Vec<u8> {
        key(BLK_PREFIX, group_id, block_id.to_hex().as_bytes())
    }

    pub fn is_block_exist(&self, group_id: &GroupId, block_id: &BlockId) -> bool {
        self.blocks
            .contains_key(Self::block_key(group_id, block_id))
            .unwrap_or(false)
    }

    pub fn get_block_chunk(&self, group_id: &GroupId, block_id: &BlockId) -> GroveResult<BlockChunk> {
        self.blocks
            .get(Self::block_key(group_id, block_id))
            .map_err(storage_err)?
            .map(|b| de(&b))
            .transpose()?
            .ok_or_else(|| GroveError::BlockNotFound(block_id.to_hex()))
    }

    fn save_block_chunk(&self, group_id: &GroupId, chunk: &BlockChunk) -> GroveResult<()> {
        self.blocks
            .insert(Self::block_key(group_id, &chunk.block.block_id), ser(chunk)?)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Save the group's genesis block. Must be called exactly once per group.
    pub fn add_genesis_block(&self, group_id: &GroupId, chunk: BlockChunk) -> GroveResult<()> {
        self.save_block_chunk(group_id, &chunk)
    }

    /// Append a new block under `parent_block_id`, updating the parent's
    /// child list in the same call so no block is ever committed with a
    /// parent whose child-list does not yet mention it (spec §9).
    pub fn add_block(&self, group_id: &GroupId, mut chunk: BlockChunk) -> GroveResult<()> {
        if self.is_block_exist(group_id, &chunk.block.block_id) {
            return Err(GroveError::BlockAlreadySaved);
        }
        let mut parent = self.get_block_chunk(group_id, &chunk.parent_block_id)?;
        chunk.height = parent.height + 1;
        parent.child_block_ids.push(chunk.block.block_id);
        self.save_block_chunk(group_id, &parent)?;
        self.save_block_chunk(group_id, &chunk)?;
        debug!(group = %group_id, block = %chunk.block.block_id.to_hex(), height = chunk.height, "block saved");
        Ok(())
    }

    pub fn remove_block(&self, group_id: &GroupId, block_id: &BlockId) -> GroveResult<()> {
        self.blocks
            .remove(Self::block_key(group_id, block_id))
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_block_height(&self, group_id: &GroupId, block_id: &BlockId) -> GroveResult<i64> {
        Ok(self.get_block_chunk(group_id, block_id)?.height)
    }

    pub fn get_child_block_ids(&self, group_id: &GroupId, block_id: &BlockId) -> GroveResult<Vec<BlockId>> {
        Ok(self.get_block_chunk(group_id, block_id)?.child_block_ids)
    }

    pub fn get_parent_block_id(&self, group_id: &GroupId, block_id: &BlockId) -> GroveResult<BlockId> {
        Ok(self.get_block_chunk(group_id, block_id)?.parent_block_id)
    }

    /// Every block chunk stored for this group, in no particular order.
    pub fn iter_all_blocks(&self, group_id: &GroupId) -> GroveResult<Vec<BlockChunk>> {
        let prefix = format!("{}_{}_", BLK_PREFIX, group_id.as_str());
        let mut out = Vec::new();
        for item in self.blocks.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Cached (uncommitted) blocks ─────────────────────────────────────────

    fn cache_key(group_id: &GroupId, block_id: &BlockId) -> Vec<u8> {
        key(CHD_PREFIX, group_id, block_id.to_hex().as_bytes())
    }

    /// Insert a block into the cache space ahead of its parent being known
    /// or validated (spec §4.7 AddBlock step 2).
    pub fn cache_block(&self, group_id: &GroupId, block: Block) -> GroveResult<()> {
        let chunk = BlockChunk {
            parent_block_id: BlockId::EMPTY,
            height: -1,
            child_block_ids: Vec::new(),
            block,
        };
        self.cache
            .insert(Self::cache_key(group_id, &chunk.block.block_id), ser(&chunk)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn is_cached(&self, group_id: &GroupId, block_id: &BlockId) -> bool {
        self.cache
            .contains_key(Self::cache_key(group_id, block_id))
            .unwrap_or(false)
    }

    pub fn get_cached_block(&self, group_id: &GroupId, block_id: &BlockId) -> GroveResult<Block> {
        self.cache
            .get(Self::cache_key(group_id, block_id))
            .map_err(storage_err)?
            .map(|b| de::<BlockChunk>(&b).map(|c| c.block))
            .transpose()?
            .ok_or_else(|| GroveError::BlockNotFound(block_id.to_hex()))
    }

    pub fn remove_cached(&self, group_id: &GroupId, block_id: &BlockId) -> GroveResult<()> {
        self.cache
            .remove(Self::cache_key(group_id, block_id))
            .map_err(storage_err)?;
        Ok(())
    }

    /// Every block currently sitting in the cache space for this group, used
    /// by the commit algorithm's descendant BFS (spec §4.7 step 5).
    pub fn list_cached(&self, group_id: &GroupId) -> GroveResult<Vec<Block>> {
        let prefix = format!("{}_{}_", CHD_PREFIX, group_id.as_str());
        let mut out = Vec::new();
        for item in self.cache.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de::<BlockChunk>(&bytes)?.block);
        }
        Ok(out)
    }

    // ── Trxs ─────────────────────────────────────────────────────────────────

    fn trx_key(group_id: &GroupId, trx_id: &TrxId) -> Vec<u8> {
        key(TRX_PREFIX, group_id, trx_id.to_hex().as_bytes())
    }

    pub fn add_trx(&self, group_id: &GroupId, trx: &Trx) -> GroveResult<()> {
        self.trxs
            .insert(Self::trx_key(group_id, &trx.trx_id), ser(trx)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_trx(&self, group_id: &GroupId, trx_id: &TrxId) -> GroveResult<Trx> {
        self.trxs
            .get(Self::trx_key(group_id, trx_id))
            .map_err(storage_err)?
            .map(|b| de(&b))
            .transpose()?
            .ok_or_else(|| GroveError::TrxNotFound(trx_id.to_hex()))
    }

    pub fn is_trx_exist(&self, group_id: &GroupId, trx_id: &TrxId) -> bool {
        self.trxs.contains_key(Self::trx_key(group_id, trx_id)).unwrap_or(false)
    }

    pub fn update_trx(&self, group_id: &GroupId, trx: &Trx) -> GroveResult<()> {
        self.add_trx(group_id, trx)
    }

    pub fn iter_trxs(&self, group_id: &GroupId) -> GroveResult<Vec<Trx>> {
        let prefix = format!("{}_{}_", TRX_PREFIX, group_id.as_str());
        let mut out = Vec::new();
        for item in self.trxs.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Producers ────────────────────────────────────────────────────────────

    pub fn put_producer(&self, item: &ProducerItem) -> GroveResult<()> {
        let k = key(PRD_PREFIX, &item.group_id, item.producer_pub_key.0.as_slice());
        self.producers.insert(k, ser(item)?).map_err(storage_err)?;
        Ok(())
    }

    pub fn list_producers(&self, group_id: &GroupId) -> GroveResult<Vec<ProducerItem>> {
        let prefix = format!("{}_{}_", PRD_PREFIX, group_id.as_str());
        let mut out = Vec::new();
        for item in self.producers.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Announces ────────────────────────────────────────────────────────────

    pub fn put_announce(&self, item: &AnnounceItem) -> GroveResult<()> {
        let k = key(ANN_PREFIX, &item.group_id, item.sign_pub_key.0.as_slice());
        self.announces.insert(k, ser(item)?).map_err(storage_err)?;
        Ok(())
    }

    pub fn list_announces(&self, group_id: &GroupId) -> GroveResult<Vec<AnnounceItem>> {
        let prefix = format!("{}_{}_", ANN_PREFIX, group_id.as_str());
        let mut out = Vec::new();
        for item in self.announces.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Deny-user list (auth) ────────────────────────────────────────────────

    pub fn put_deny_user(&self, item: &DenyUserItem) -> GroveResult<()> {
        let k = key(ATH_PREFIX, &item.group_id, item.user_sign_pub_key.0.as_slice());
        self.deny_users.insert(k, ser(item)?).map_err(storage_err)?;
        Ok(())
    }

    pub fn is_user_denied(&self, group_id: &GroupId, user_pub_key: &[u8]) -> bool {
        let k = key(ATH_PREFIX, group_id, user_pub_key);
        match self.deny_users.get(k) {
            Ok(Some(bytes)) => match de::<DenyUserItem>(&bytes) {
                Ok(item) => item.action == UpsertAction::Add,
                Err(_) => false,
            },
            _ => false,
        }
    }

    // ── Schemas ──────────────────────────────────────────────────────────────

    pub fn put_schema(&self, item: &SchemaItem) -> GroveResult<()> {
        let k = key(SMA_PREFIX, &item.group_id, item.type_name.as_bytes());
        self.schemas.insert(k, ser(item)?).map_err(storage_err)?;
        Ok(())
    }

    pub fn list_schemas(&self, group_id: &GroupId) -> GroveResult<Vec<SchemaItem>> {
        let prefix = format!("{}_{}_", SMA_PREFIX, group_id.as_str());
        let mut out = Vec::new();
        for item in self.schemas.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Counters (sequence allocators, e.g. for grove-index) ────────────────

    pub fn next_seq(&self, name: &str) -> GroveResult<u64> {
        let current = self
            .counters
            .get(name)
            .map_err(storage_err)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(0);
        self.counters
            .insert(name, (current + 1).to_be_bytes().to_vec())
            .map_err(storage_err)?;
        Ok(current)
    }

    // ── Generic meta ─────────────────────────────────────────────────────────

    pub fn put_meta(&self, k: &str, v: &[u8]) -> GroveResult<()> {
        self.meta.insert(k, v).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, k: &str) -> GroveResult<Option<Vec<u8>>> {
        self.meta
            .get(k)
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage_err)
    }

    /// Ordered scan of every meta key under `prefix` (used by `grove-index`
    /// to walk its `cnt_grp-<groupId>_<seq>_<sender>:<trxId>` entries).
    pub fn scan_meta_prefix(&self, prefix: &str) -> GroveResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.meta.scan_prefix(prefix.as_bytes()) {
            let (k, v) = item.map_err(storage_err)?;
            let key_str = String::from_utf8(k.to_vec()).map_err(|e| GroveError::Other(e.to_string()))?;
            out.push((key_str, v.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::block::Block;
    use grove_core::types::{Digest32, SignPublicKey};

    fn open_tmp() -> (tempfile::TempDir, StorageDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = StorageDb::open(dir.path()).unwrap();
        (dir, db)
    }

    fn genesis_block(group_id: GroupId) -> Block {
        Block {
            block_id: BlockId::new_v4(),
            group_id,
            prev_block_id: BlockId::EMPTY,
            prev_hash: Digest32::ZERO,
            trxs: Vec::new(),
            producer_pub_key: SignPublicKey(vec![1, 2, 3]),
            timestamp: 0,
            hash: Digest32::ZERO,
            signature: grove_core::types::Signature(vec![]),
        }
    }

    #[test]
    fn add_and_get_group() {
        let (_dir, db) = open_tmp();
        let group_id = GroupId::new_v4();
        let genesis = genesis_block(group_id.clone());
        let item = GroupItem {
            group_id: group_id.clone(),
            group_name: "test".into(),
            genesis_block: genesis.clone(),
            owner_pub_key: SignPublicKey(vec![1]),
            user_sign_pub_key: SignPublicKey(vec![1]),
            user_encrypt_pub_key: grove_core::types::EncryptPublicKey(vec![2]),
            cipher_key: grove_core::types::CipherKey([9u8; 32]),
            app_key: "chat".into(),
            highest_block_id: genesis.block_id,
            highest_height: 0,
            consensus_type: grove_core::membership::ConsensusType::Poa,
            encrypt_type: grove_core::membership::GroupEncryptType::Private,
            last_update: 0,
        };
        db.add_group(&item).unwrap();
        let fetched = db.get_group(&group_id).unwrap();
        assert_eq!(fetched.group_name, "test");
        assert!(matches!(db.add_group(&item).unwrap_err(), GroveError::GroupAlreadyExists));
    }

    #[test]
    fn block_chain_extends_parent_child_list() {
        let (_dir, db) = open_tmp();
        let group_id = GroupId::new_v4();
        let genesis = genesis_block(group_id.clone());
        db.add_genesis_block(&group_id, BlockChunk::genesis(genesis.clone())).unwrap();

        let mut child = genesis_block(group_id.clone());
        child.prev_block_id = genesis.block_id;
        let child_chunk = BlockChunk::child(child.clone(), genesis.block_id, 0);
        db.add_block(&group_id, child_chunk).unwrap();

        let parent_chunk = db.get_block_chunk(&group_id, &genesis.block_id).unwrap();
        assert_eq!(parent_chunk.child_block_ids, vec![child.block_id]);
        assert_eq!(db.get_block_height(&group_id, &child.block_id).unwrap(), 1);
    }

    #[test]
    fn cached_block_promotes_to_committed() {
        let (_dir, db) = open_tmp();
        let group_id = GroupId::new_v4();
        let genesis = genesis_block(group_id.clone());
        db.add_genesis_block(&group_id, BlockChunk::genesis(genesis.clone())).unwrap();

        let mut orphan = genesis_block(group_id.clone());
        orphan.prev_block_id = BlockId::new_v4();
        db.cache_block(&group_id, orphan.clone()).unwrap();
        assert!(db.is_cached(&group_id, &orphan.block_id));

        let mut child = genesis_block(group_id.clone());
        child.prev_block_id = genesis.block_id;
        let chunk = BlockChunk::child(child.clone(), genesis.block_id, 0);
        db.add_block(&group_id, chunk).unwrap();
        db.remove_cached(&group_id, &orphan.block_id).unwrap();
        assert!(!db.is_cached(&group_id, &orphan.block_id));
        assert!(db.is_block_exist(&group_id, &child.block_id));
    }

    #[test]
    fn add_block_without_parent_fails() {
        let (_dir, db) = open_tmp();
        let group_id = GroupId::new_v4();
        let orphan = genesis_block(group_id.clone());
        let chunk = BlockChunk::child(orphan, BlockId::new_v4(), 0);
        assert!(db.add_block(&group_id, chunk).is_err());
    }

    #[test]
    fn deny_user_can_be_reversed_by_a_later_remove() {
        let (_dir, db) = open_tmp();
        let group_id = GroupId::new_v4();
        let user = SignPublicKey(vec![4, 5, 6]);

        assert!(!db.is_user_denied(&group_id, &user.0));

        db.put_deny_user(&DenyUserItem {
            group_id: group_id.clone(),
            user_sign_pub_key: user.clone(),
            action: UpsertAction::Add,
        })
        .unwrap();
        assert!(db.is_user_denied(&group_id, &user.0));

        db.put_deny_user(&DenyUserItem {
            group_id: group_id.clone(),
            user_sign_pub_key: user.clone(),
            action: UpsertAction::Remove,
        })
        .unwrap();
        assert!(!db.is_user_denied(&group_id, &user.0));
    }
}
