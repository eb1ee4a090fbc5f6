//! The per-group chain-replication engine (spec §4.7): `HandleTrx`,
//! `HandleBlock`, and the `AddBlock` commit algorithm, plus the thin
//! producer-role methods layered on top.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use grove_core::block::Block;
use grove_core::constants::{SYNC_RETRY_CAP, SYNC_RETRY_INTERVAL_SECS};
use grove_core::error::{GroveError, GroveResult};
use grove_core::membership::{
    AnnounceItem, DenyUserItem, GroupItem, ProducerAction, ProducerItem, SchemaItem,
};
use grove_core::trx::{Trx, TrxType};
use grove_core::types::{BlockId, Digest32, EncryptPublicKey, GroupId, SignPublicKey, Signature};
use grove_keystore::Keystore;
use grove_p2p::{Channel, P2pCommand};
use grove_storage::{BlockChunk, StorageDb};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec;
use crate::role::{ChainRole, ProducerState};
use crate::syncer::Syncer;
use crate::trxmgr::{now_secs, TrxMgr};
use crate::wire::{BlockProducedPayload, ReqBlockPayload, ReqBlockRespPayload, ReqBlockResult};

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Narrow capability `Chain` calls into when a POST trx commits, so the
/// replication engine stays decoupled from the content-index crate (same
/// coupling discipline as the transport boundary, spec §9).
pub trait ContentIndexer: Send + Sync {
    fn index_post(&self, group_id: &GroupId, block_id: BlockId, trx: &Trx) -> GroveResult<()>;
}

pub struct Chain {
    storage: Arc<StorageDb>,
    keystore: Arc<Keystore>,
    group: RwLock<GroupItem>,
    sign_key_name: String,
    encrypt_key_name: String,
    version: String,
    user_trx_mgr: TrxMgr,
    producer_trx_mgr: TrxMgr,
    producer_pool: RwLock<HashMap<Vec<u8>, ProducerItem>>,
    role: RwLock<ChainRole>,
    syncer: Syncer,
    indexer: Option<Arc<dyn ContentIndexer>>,
}

impl Chain {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<StorageDb>,
        keystore: Arc<Keystore>,
        group: GroupItem,
        sign_key_name: String,
        encrypt_key_name: String,
        version: String,
        expiration_secs: i64,
        p2p_tx: mpsc::Sender<P2pCommand>,
        indexer: Option<Arc<dyn ContentIndexer>>,
    ) -> GroveResult<Self> {
        let user_trx_mgr = TrxMgr::new(
            Channel::User,
            keystore.clone(),
            sign_key_name.clone(),
            version.clone(),
            expiration_secs,
            p2p_tx.clone(),
        );
        let producer_trx_mgr = TrxMgr::new(
            Channel::Producer,
            keystore.clone(),
            sign_key_name.clone(),
            version.clone(),
            expiration_secs,
            p2p_tx,
        );
        let chain = Self {
            storage,
            keystore,
            group: RwLock::new(group),
            sign_key_name,
            encrypt_key_name,
            version,
            user_trx_mgr,
            producer_trx_mgr,
            producer_pool: RwLock::new(HashMap::new()),
            role: RwLock::new(ChainRole::User),
            syncer: Syncer::new(SYNC_RETRY_INTERVAL_SECS, SYNC_RETRY_CAP),
            indexer,
        };
        chain.reload_producer_pool()?;
        Ok(chain)
    }

    pub fn group(&self) -> GroupItem {
        self.group.read().unwrap().clone()
    }

    pub fn syncer(&self) -> &Syncer {
        &self.syncer
    }

    pub fn is_producer(&self) -> bool {
        self.role.read().unwrap().is_producer()
    }

    // ── Role / producer-pool maintenance ─────────────────────────────────────

    fn reload_producer_pool(&self) -> GroveResult<()> {
        let group_id = self.group.read().unwrap().group_id.clone();
        let items = self.storage.list_producers(&group_id)?;
        let mut pool = self.producer_pool.write().unwrap();
        pool.clear();
        for item in items {
            match item.action {
                ProducerAction::Add => {
                    pool.insert(item.producer_pub_key.0.clone(), item);
                }
                ProducerAction::Remove => {
                    pool.remove(&item.producer_pub_key.0);
                }
            }
        }
        drop(pool);
        self.reload_role();
        Ok(())
    }

    /// Role selection (spec §4.7): a node is additionally a Producer iff its
    /// own user signing key is present in the producer pool. Demoting a
    /// running producer drops its pending pool; promoting one starts empty.
    fn reload_role(&self) {
        let is_producer = {
            let group = self.group.read().unwrap();
            self.producer_pool
                .read()
                .unwrap()
                .contains_key(&group.user_sign_pub_key.0)
        };
        let mut role = self.role.write().unwrap();
        let currently_producer = role.is_producer();
        if is_producer && !currently_producer {
            *role = ChainRole::UserAndProducer(ProducerState::new());
        } else if !is_producer && currently_producer {
            *role = ChainRole::User;
        }
    }

    /// Spec §4.7: only a producer the group owner has announced into the
    /// producer pool may have its blocks committed.
    fn is_approved_producer(&self, producer_pub_key: &SignPublicKey) -> bool {
        self.producer_pool.read().unwrap().contains_key(&producer_pub_key.0)
    }

    fn add_trx_pending(&self, trx: Trx) {
        if let ChainRole::UserAndProducer(state) = &*self.role.read().unwrap() {
            state.pending.lock().unwrap().push(trx);
        }
    }

    // ── HandleTrx (spec §4.7) ────────────────────────────────────────────────

    pub async fn handle_trx(&self, trx: Trx) -> GroveResult<()> {
        if trx.version != self.version {
            return Err(GroveError::VersionMismatch {
                expected: self.version.clone(),
                got: trx.version.clone(),
            });
        }
        if !self.user_trx_mgr.verify_trx(&trx) {
            return Err(GroveError::InvalidSignature);
        }
        if trx.is_expired(now_secs()) {
            debug!(trx = %trx.trx_id, "dropping expired trx");
            return Ok(());
        }
        let group_id = self.group.read().unwrap().group_id.clone();
        if self.storage.is_user_denied(&group_id, &trx.sender_pub_key.0) {
            debug!(trx = %trx.trx_id, sender = %hex::encode(&trx.sender_pub_key.0), "dropping trx from denied user");
            return Ok(());
        }
        if self.storage.is_trx_exist(&group_id, &trx.trx_id) {
            return Ok(());
        }
        self.storage.add_trx(&group_id, &trx)?;

        match trx.trx_type {
            TrxType::Post
            | TrxType::Auth
            | TrxType::Announce
            | TrxType::Producer
            | TrxType::Schema => {
                self.add_trx_pending(trx);
                Ok(())
            }
            TrxType::ReqBlockForward => self.handle_req_block_forward(trx).await,
            TrxType::ReqBlockBackward => self.handle_req_block_backward(trx).await,
            TrxType::ReqBlockResp => self.handle_req_block_resp(trx).await,
            TrxType::BlockProduced => self.handle_block_produced(trx).await,
        }
    }

    fn decode_payload<T: serde::de::DeserializeOwned>(
        &self,
        trx: &Trx,
        group: &GroupItem,
    ) -> GroveResult<T> {
        let plain = grove_crypto::aes_decrypt(&trx.data, &group.cipher_key)
            .map_err(|e| GroveError::DecryptFailed(e.to_string()))?;
        bincode::deserialize(&plain).map_err(|e| GroveError::Serialization(e.to_string()))
    }

    async fn handle_req_block_forward(&self, trx: Trx) -> GroveResult<()> {
        let group = self.group();
        if !self.is_producer() {
            return Ok(());
        }
        let payload: ReqBlockPayload = self.decode_payload(&trx, &group)?;
        let children = self
            .storage
            .get_child_block_ids(&group.group_id, &payload.block_id)
            .unwrap_or_default();
        if children.is_empty() {
            let resp = ReqBlockRespPayload {
                requester_pub_key: payload.requester_pub_key,
                nonce: payload.nonce,
                result: ReqBlockResult::BlockNotFound,
                block: None,
            };
            self.producer_trx_mgr.send_req_block_resp_trx(&group, &resp).await?;
            return Ok(());
        }
        for child_id in children {
            let chunk = self.storage.get_block_chunk(&group.group_id, &child_id)?;
            let resp = ReqBlockRespPayload {
                requester_pub_key: payload.requester_pub_key.clone(),
                nonce: payload.nonce,
                result: ReqBlockResult::Found,
                block: Some(chunk.block),
            };
            self.producer_trx_mgr.send_req_block_resp_trx(&group, &resp).await?;
        }
        Ok(())
    }

    async fn handle_req_block_backward(&self, trx: Trx) -> GroveResult<()> {
        let group = self.group();
        if !self.is_producer() {
            return Ok(());
        }
        let payload: ReqBlockPayload = self.decode_payload(&trx, &group)?;
        let resp = match self.storage.get_block_chunk(&group.group_id, &payload.block_id) {
            Ok(chunk) => ReqBlockRespPayload {
                requester_pub_key: payload.requester_pub_key,
                nonce: payload.nonce,
                result: ReqBlockResult::Found,
                block: Some(chunk.block),
            },
            Err(_) => ReqBlockRespPayload {
                requester_pub_key: payload.requester_pub_key,
                nonce: payload.nonce,
                result: ReqBlockResult::BlockNotFound,
                block: None,
            },
        };
        self.producer_trx_mgr.send_req_block_resp_trx(&group, &resp).await?;
        Ok(())
    }

    async fn handle_req_block_resp(&self, trx: Trx) -> GroveResult<()> {
        let group = self.group();
        let payload: ReqBlockRespPayload = self.decode_payload(&trx, &group)?;
        if payload.requester_pub_key != group.user_sign_pub_key {
            return Ok(());
        }
        if self.syncer.current_nonce() != Some(payload.nonce) {
            return Ok(());
        }
        match payload.result {
            ReqBlockResult::BlockNotFound => {
                let known: Vec<SignPublicKey> = self
                    .producer_pool
                    .read()
                    .unwrap()
                    .values()
                    .map(|p| p.producer_pub_key.clone())
                    .collect();
                self.syncer.mark_exhausted(&trx.sender_pub_key, &known);
                Ok(())
            }
            ReqBlockResult::Found => {
                let Some(block) = payload.block else { return Ok(()) };
                match self.add_block(block.clone()).await {
                    Ok(()) => {
                        let nonce = self.syncer.advance_forward(block.block_id);
                        self.user_trx_mgr
                            .send_req_block_forward_trx(
                                &group,
                                block.block_id,
                                group.user_sign_pub_key.clone(),
                                nonce,
                            )
                            .await?;
                        Ok(())
                    }
                    Err(GroveError::ParentNotExist) => {
                        let nonce = self.syncer.sync_backward(block.prev_block_id);
                        self.user_trx_mgr
                            .send_req_block_backward_trx(
                                &group,
                                block.prev_block_id,
                                group.user_sign_pub_key.clone(),
                                nonce,
                            )
                            .await?;
                        Ok(())
                    }
                    Err(e) => {
                        warn!(block = %block.block_id, error = %e, "rejected synced block");
                        Ok(())
                    }
                }
            }
        }
    }

    async fn handle_block_produced(&self, trx: Trx) -> GroveResult<()> {
        let group = self.group();
        let payload: BlockProducedPayload = self.decode_payload(&trx, &group)?;
        match self.add_block(payload.block).await {
            Ok(()) | Err(GroveError::ParentNotExist) | Err(GroveError::BlockAlreadySaved) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ── HandleBlock / AddBlock (spec §4.7) ───────────────────────────────────

    /// Entry point for a `Block` package arriving straight off gossip.
    /// Missing-parent is not an error here: it starts a backward sync.
    pub async fn handle_block(&self, block: Block) -> GroveResult<()> {
        match self.add_block(block.clone()).await {
            Ok(()) => Ok(()),
            Err(GroveError::ParentNotExist) => {
                let group = self.group();
                let nonce = self.syncer.sync_backward(block.prev_block_id);
                self.user_trx_mgr
                    .send_req_block_backward_trx(
                        &group,
                        block.prev_block_id,
                        group.user_sign_pub_key.clone(),
                        nonce,
                    )
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// The ten-step commit algorithm (spec §4.7). Idempotent: re-adding an
    /// already-committed block is a silent no-op.
    pub async fn add_block(&self, block: Block) -> GroveResult<()> {
        let group_id = self.group.read().unwrap().group_id.clone();

        if self.storage.is_block_exist(&group_id, &block.block_id) {
            return Ok(());
        }

        self.storage.cache_block(&group_id, block.clone())?;

        if !self.storage.is_block_exist(&group_id, &block.prev_block_id) {
            return Err(GroveError::ParentNotExist);
        }

        if !self.is_approved_producer(&block.producer_pub_key) {
            self.storage.remove_cached(&group_id, &block.block_id)?;
            return Err(GroveError::ProducerNotAnnounced);
        }

        let parent_chunk = self.storage.get_block_chunk(&group_id, &block.prev_block_id)?;
        if let Err(e) = codec::is_block_valid(&block, &parent_chunk.block) {
            self.storage.remove_cached(&group_id, &block.block_id)?;
            return Err(e);
        }

        let gathered = self.gather_descendants(&group_id, &block)?;
        let apply_group = self.group();

        for b in &gathered {
            let parent = match self.storage.get_block_chunk(&group_id, &b.prev_block_id) {
                Ok(p) => p,
                Err(_) => continue, // parent not yet committed this round; leave in cache
            };
            if !self.is_approved_producer(&b.producer_pub_key) {
                warn!(block = %b.block_id, producer = %hex::encode(&b.producer_pub_key.0), "dropping block from non-pool producer");
                continue;
            }
            if codec::is_block_valid(b, &parent.block).is_err() {
                warn!(block = %b.block_id, "dropping invalid cached block");
                continue;
            }
            let chunk = BlockChunk::child(b.clone(), b.prev_block_id, 0);
            self.storage.add_block(&group_id, chunk)?;
            self.storage.remove_cached(&group_id, &b.block_id)?;

            for trx in &b.trxs {
                self.apply_trx(b.block_id, trx, &apply_group)?;
            }
            if let Some(p) = self
                .producer_pool
                .write()
                .unwrap()
                .get_mut(&b.producer_pub_key.0)
            {
                p.blocks_produced += 1;
            }
        }

        self.recompute_head(&group_id, &apply_group, &gathered).await?;
        Ok(())
    }

    /// BFS over the cache space for every block transitively parented by
    /// `root`, root first, each entry preceding its own children — so a
    /// straight walk commits parents before children (spec §4.7 step 5).
    fn gather_descendants(&self, group_id: &GroupId, root: &Block) -> GroveResult<Vec<Block>> {
        let cached = self.storage.list_cached(group_id)?;
        let mut gathered = vec![root.clone()];
        let mut frontier = vec![root.block_id];
        loop {
            let mut next = Vec::new();
            for b in &cached {
                if frontier.contains(&b.prev_block_id)
                    && !gathered.iter().any(|g| g.block_id == b.block_id)
                {
                    gathered.push(b.clone());
                    next.push(b.block_id);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(gathered)
    }

    fn apply_trx(&self, block_id: BlockId, trx: &Trx, group: &GroupItem) -> GroveResult<()> {
        match trx.trx_type {
            TrxType::Post => {
                if let Some(indexer) = &self.indexer {
                    indexer.index_post(&group.group_id, block_id, trx)?;
                }
            }
            TrxType::Auth => {
                let item: DenyUserItem = self.decode_control(trx, group)?;
                self.storage.put_deny_user(&item)?;
            }
            TrxType::Producer => {
                let item: ProducerItem = self.decode_control(trx, group)?;
                self.storage.put_producer(&item)?;
                self.reload_producer_pool()?;
            }
            TrxType::Announce => {
                let item: AnnounceItem = self.decode_control(trx, group)?;
                self.storage.put_announce(&item)?;
            }
            TrxType::Schema => {
                let item: SchemaItem = self.decode_control(trx, group)?;
                self.storage.put_schema(&item)?;
            }
            _ => warn!(trx = %trx.trx_id, "unexpected control trx inside a committed block"),
        }
        Ok(())
    }

    fn decode_control<T: serde::de::DeserializeOwned>(
        &self,
        trx: &Trx,
        group: &GroupItem,
    ) -> GroveResult<T> {
        let plain = grove_crypto::aes_decrypt(&trx.data, &group.cipher_key)
            .map_err(|e| GroveError::DecryptFailed(e.to_string()))?;
        bincode::deserialize(&plain).map_err(|e| GroveError::Serialization(e.to_string()))
    }

    /// Steps 8-10: recompute the chain head across the old head and every
    /// block just committed (greatest height wins, lexicographically smaller
    /// hash breaks a tie — DESIGN.md Open Question #1), trim and resend on
    /// re-org, then persist.
    async fn recompute_head(
        &self,
        group_id: &GroupId,
        old_group: &GroupItem,
        gathered: &[Block],
    ) -> GroveResult<()> {
        let mut winner_id = old_group.highest_block_id;
        let mut winner_height = old_group.highest_height;
        let mut winner_hash = self.storage.get_block_chunk(group_id, &winner_id)?.block.hash;

        for b in gathered {
            if !self.storage.is_block_exist(group_id, &b.block_id) {
                continue;
            }
            let h = self.storage.get_block_height(group_id, &b.block_id)?;
            if h > winner_height || (h == winner_height && b.hash < winner_hash) {
                winner_height = h;
                winner_id = b.block_id;
                winner_hash = b.hash;
            }
        }

        if winner_id == old_group.highest_block_id {
            return Ok(());
        }

        if !self.is_ancestor(group_id, old_group.highest_block_id, winner_id)? {
            self.trim_and_resend(group_id, old_group.highest_block_id, winner_id).await?;
        }

        let mut group = self.group.write().unwrap();
        group.highest_block_id = winner_id;
        group.highest_height = winner_height;
        group.last_update = now_secs();
        self.storage.put_group(&group)?;
        info!(group = %group_id, head = %winner_id, height = winner_height, "chain head advanced");
        Ok(())
    }

    fn is_ancestor(&self, group_id: &GroupId, ancestor: BlockId, descendant: BlockId) -> GroveResult<bool> {
        let mut cur = descendant;
        loop {
            if cur == ancestor {
                return Ok(true);
            }
            let chunk = self.storage.get_block_chunk(group_id, &cur)?;
            if chunk.parent_block_id == BlockId::EMPTY {
                return Ok(false);
            }
            cur = chunk.parent_block_id;
        }
    }

    fn ancestors(&self, group_id: &GroupId, start: BlockId) -> GroveResult<Vec<BlockId>> {
        let mut out = vec![start];
        let mut cur = start;
        loop {
            let chunk = self.storage.get_block_chunk(group_id, &cur)?;
            if chunk.parent_block_id == BlockId::EMPTY {
                break;
            }
            cur = chunk.parent_block_id;
            out.push(cur);
        }
        Ok(out)
    }

    /// Trim set = gathered set − longest-path set (DESIGN.md Open Question
    /// #3): walk both heads back to their common ancestor, trim whatever is
    /// only on the losing path, and resend this node's own trxs from those
    /// blocks with `resend_count` incremented.
    async fn trim_and_resend(
        &self,
        group_id: &GroupId,
        old_head: BlockId,
        new_head: BlockId,
    ) -> GroveResult<()> {
        let old_ancestors = self.ancestors(group_id, old_head)?;
        let new_ancestors = self.ancestors(group_id, new_head)?;
        let new_set: HashSet<BlockId> = new_ancestors.iter().copied().collect();
        let fork_point = old_ancestors
            .iter()
            .find(|id| new_set.contains(id))
            .copied()
            .unwrap_or(BlockId::EMPTY);

        let trimmed: Vec<BlockId> = old_ancestors
            .into_iter()
            .take_while(|id| *id != fork_point)
            .collect();

        let group = self.group();
        for block_id in trimmed {
            let chunk = self.storage.get_block_chunk(group_id, &block_id)?;
            for trx in &chunk.block.trxs {
                if trx.sender_pub_key != group.user_sign_pub_key {
                    continue;
                }
                let mut resent = trx.clone();
                resent.resend_count += 1;
                resent.sender_sig = self
                    .keystore
                    .sign_by_key_name(&self.sign_key_name, &resent.signable_bytes())?;
                self.storage.update_trx(group_id, &resent)?;
                self.user_trx_mgr.republish(&group, resent).await?;
            }
            info!(group = %group_id, block = %block_id, "block trimmed by fork resolution");
        }
        Ok(())
    }

    // ── Producer-role operations (spec §4.7) ─────────────────────────────────

    /// Pack the pending pool into a new block, commit it locally, and gossip
    /// it on the producer channel. No-op for a non-producer or an empty pool.
    pub async fn produce_block(&self) -> GroveResult<Option<Block>> {
        let trxs = {
            let role = self.role.read().unwrap();
            let ChainRole::UserAndProducer(state) = &*role else {
                return Ok(None);
            };
            let mut pending = state.pending.lock().unwrap();
            let now = now_secs();
            pending.retain(|t| !t.is_expired(now));
            if pending.is_empty() {
                return Ok(None);
            }
            std::mem::take(&mut *pending)
        };

        let group = self.group();
        let parent = self.storage.get_block_chunk(&group.group_id, &group.highest_block_id)?;

        let mut block = Block {
            block_id: BlockId::new_v4(),
            group_id: group.group_id.clone(),
            prev_block_id: parent.block.block_id,
            prev_hash: parent.block.hash,
            trxs,
            producer_pub_key: group.user_sign_pub_key.clone(),
            timestamp: now_nanos(),
            hash: Digest32::ZERO,
            signature: Signature(Vec::new()),
        };
        block.hash = codec::hash_block(&block);
        block.signature = self
            .keystore
            .sign_by_key_name(&self.sign_key_name, &block.hash.0)?;

        self.add_block(block.clone()).await?;
        self.producer_trx_mgr.send_block(&group, &block).await?;
        Ok(Some(block))
    }

    // ── User-role operations ─────────────────────────────────────────────────

    /// `PostAny` gated on the syncer being IDLE (spec §4.7/§9: a group that is
    /// syncing or has failed to sync refuses new posts).
    pub async fn post(&self, content: &[u8], recipients: &[EncryptPublicKey]) -> GroveResult<Trx> {
        if !self.syncer.is_idle() {
            return Err(GroveError::GroupNotReadyForPost);
        }
        let group = self.group();
        self.user_trx_mgr.post_any(&group, content, recipients).await
    }

    pub async fn send_announce(&self, item: &AnnounceItem) -> GroveResult<Trx> {
        let group = self.group();
        self.user_trx_mgr.send_announce_trx(&group, item).await
    }

    pub async fn send_producer_change(&self, item: &ProducerItem) -> GroveResult<Trx> {
        let group = self.group();
        self.user_trx_mgr.send_producer_trx(&group, item).await
    }

    pub async fn send_deny_user(&self, item: &DenyUserItem) -> GroveResult<Trx> {
        let group = self.group();
        self.user_trx_mgr.send_deny_user_trx(&group, item).await
    }

    pub async fn send_schema(&self, item: &SchemaItem) -> GroveResult<Trx> {
        let group = self.group();
        self.user_trx_mgr.send_schema_trx(&group, item).await
    }

    /// `StartSync()` (spec §4.8): kick off a forward sync from the current head.
    pub async fn start_sync(&self) -> GroveResult<()> {
        let group = self.group();
        let nonce = self.syncer.start_sync(group.highest_block_id)?;
        self.user_trx_mgr
            .send_req_block_forward_trx(&group, group.highest_block_id, group.user_sign_pub_key.clone(), nonce)
            .await?;
        Ok(())
    }

    pub fn encrypt_key_name(&self) -> &str {
        &self.encrypt_key_name
    }

    /// Decrypt a committed POST trx's raw payload for a content-query reader
    /// (spec §4.10): the same rule `TrxMgr::create_trx` used to encrypt it.
    pub fn decrypt_post(&self, trx: &Trx) -> GroveResult<Vec<u8>> {
        let group = self.group();
        match crate::encryption::encryption_rule_for(trx.trx_type, group.encrypt_type) {
            crate::encryption::EncryptionRule::Symmetric => {
                grove_crypto::aes_decrypt(&trx.data, &group.cipher_key)
                    .map_err(|e| GroveError::DecryptFailed(e.to_string()))
            }
            crate::encryption::EncryptionRule::AsymmetricToApprovedUsers => {
                self.keystore.decrypt_with_key_name(&self.encrypt_key_name, &trx.data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::membership::{ConsensusType, GroupEncryptType, UpsertAction};
    use grove_core::types::CipherKey;
    use grove_keystore::storedkey::KeyType;

    fn group_with_genesis(group_id: GroupId, sign_pub: SignPublicKey, encrypt_pub: grove_core::types::EncryptPublicKey, genesis: Block) -> GroupItem {
        GroupItem {
            group_id,
            group_name: "test".into(),
            genesis_block: genesis.clone(),
            owner_pub_key: sign_pub.clone(),
            user_sign_pub_key: sign_pub,
            user_encrypt_pub_key: encrypt_pub,
            cipher_key: CipherKey([7u8; 32]),
            app_key: "chat".into(),
            highest_block_id: genesis.block_id,
            highest_height: 0,
            consensus_type: ConsensusType::Poa,
            encrypt_type: GroupEncryptType::Public,
            last_update: 0,
        }
    }

    async fn new_chain_with_producer() -> (tempfile::TempDir, tempfile::TempDir, Chain, SignPublicKey) {
        let storage_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageDb::open(storage_dir.path()).unwrap());
        let keystore_dir = tempfile::tempdir().unwrap();
        let keystore = Arc::new(grove_keystore::Keystore::open(keystore_dir.path()).unwrap());

        let sign_pub_hex = keystore.new_key("sign", KeyType::Sign, "pw").unwrap();
        let sign_pub = SignPublicKey(hex::decode(sign_pub_hex).unwrap());
        let encrypt_pub_hex = keystore.new_key("encrypt", KeyType::Encrypt, "pw").unwrap();
        let encrypt_pub = grove_core::types::EncryptPublicKey(hex::decode(encrypt_pub_hex).unwrap());

        let group_id = GroupId::new_v4();
        let genesis = Block {
            block_id: BlockId::new_v4(),
            group_id: group_id.clone(),
            prev_block_id: BlockId::EMPTY,
            prev_hash: Digest32::ZERO,
            trxs: Vec::new(),
            producer_pub_key: sign_pub.clone(),
            timestamp: 0,
            hash: Digest32::ZERO,
            signature: Signature(Vec::new()),
        };
        storage
            .add_genesis_block(&group_id, BlockChunk::genesis(genesis.clone()))
            .unwrap();

        let group = group_with_genesis(group_id.clone(), sign_pub.clone(), encrypt_pub, genesis);
        storage.add_group(&group).unwrap();
        storage
            .put_producer(&ProducerItem {
                group_id: group_id.clone(),
                producer_pub_key: sign_pub.clone(),
                action: ProducerAction::Add,
                blocks_produced: 0,
            })
            .unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let chain = Chain::new(
            storage,
            keystore,
            group,
            "sign".into(),
            "encrypt".into(),
            "1".into(),
            300,
            tx,
            None,
        )
        .unwrap();
        (storage_dir, keystore_dir, chain, sign_pub)
    }

    #[tokio::test]
    async fn self_role_is_producer_when_in_pool() {
        let (_sd, _kd, chain, _pk) = new_chain_with_producer().await;
        assert!(chain.is_producer());
    }

    #[tokio::test]
    async fn produce_block_with_empty_pool_is_noop() {
        let (_sd, _kd, chain, _pk) = new_chain_with_producer().await;
        assert!(chain.produce_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_block_is_idempotent() {
        let (_sd, _kd, chain, _pk) = new_chain_with_producer().await;
        let group = chain.group();
        let parent = chain.storage.get_block_chunk(&group.group_id, &group.highest_block_id).unwrap();

        let mut block = Block {
            block_id: BlockId::new_v4(),
            group_id: group.group_id.clone(),
            prev_block_id: parent.block.block_id,
            prev_hash: parent.block.hash,
            trxs: Vec::new(),
            producer_pub_key: group.user_sign_pub_key.clone(),
            timestamp: 1,
            hash: Digest32::ZERO,
            signature: Signature(Vec::new()),
        };
        block.hash = codec::hash_block(&block);
        block.signature = chain.keystore.sign_by_key_name("sign", &block.hash.0).unwrap();

        chain.add_block(block.clone()).await.unwrap();
        assert_eq!(chain.group().highest_block_id, block.block_id);
        // committing the same block again changes nothing
        chain.add_block(block.clone()).await.unwrap();
        assert_eq!(chain.group().highest_block_id, block.block_id);
    }

    #[tokio::test]
    async fn handle_trx_from_denied_user_is_dropped() {
        let (_sd, _kd, chain, _pk) = new_chain_with_producer().await;
        let group = chain.group();

        let intruder_pub_hex = chain.keystore.new_key("intruder", KeyType::Sign, "pw").unwrap();
        let intruder_pub = SignPublicKey(hex::decode(intruder_pub_hex).unwrap());

        chain
            .storage
            .put_deny_user(&DenyUserItem {
                group_id: group.group_id.clone(),
                user_sign_pub_key: intruder_pub.clone(),
                action: UpsertAction::Add,
            })
            .unwrap();

        let data = grove_crypto::aes_encrypt(b"hello", &group.cipher_key).unwrap();
        let mut trx = Trx {
            trx_id: grove_core::types::TrxId::new_v4(),
            trx_type: TrxType::Post,
            group_id: group.group_id.clone(),
            sender_pub_key: intruder_pub.clone(),
            data,
            timestamp: now_secs(),
            expired: now_secs() + 300,
            version: "1".into(),
            resend_count: 0,
            sender_sig: Signature(Vec::new()),
        };
        trx.sender_sig = chain
            .keystore
            .sign_by_key_name("intruder", &trx.signable_bytes())
            .unwrap();

        chain.handle_trx(trx.clone()).await.unwrap();
        assert!(!chain.storage.is_trx_exist(&group.group_id, &trx.trx_id));
    }

    #[tokio::test]
    async fn add_block_from_non_pool_producer_is_rejected() {
        let (_sd, _kd, chain, _pk) = new_chain_with_producer().await;
        let group = chain.group();
        let parent = chain.storage.get_block_chunk(&group.group_id, &group.highest_block_id).unwrap();

        let mut block = Block {
            block_id: BlockId::new_v4(),
            group_id: group.group_id.clone(),
            prev_block_id: parent.block.block_id,
            prev_hash: parent.block.hash,
            trxs: Vec::new(),
            producer_pub_key: SignPublicKey(vec![0xAB; 33]),
            timestamp: 1,
            hash: Digest32::ZERO,
            signature: Signature(Vec::new()),
        };
        block.hash = codec::hash_block(&block);

        assert!(matches!(
            chain.add_block(block).await.unwrap_err(),
            GroveError::ProducerNotAnnounced
        ));
        assert_eq!(chain.group().highest_block_id, group.highest_block_id);
    }

    #[tokio::test]
    async fn add_block_with_unknown_parent_triggers_backward_sync() {
        let (_sd, _kd, chain, _pk) = new_chain_with_producer().await;
        let group = chain.group();
        let orphan = Block {
            block_id: BlockId::new_v4(),
            group_id: group.group_id.clone(),
            prev_block_id: BlockId::new_v4(),
            prev_hash: Digest32::ZERO,
            trxs: Vec::new(),
            producer_pub_key: group.user_sign_pub_key.clone(),
            timestamp: 1,
            hash: Digest32::ZERO,
            signature: Signature(Vec::new()),
        };
        assert!(matches!(
            chain.add_block(orphan).await.unwrap_err(),
            GroveError::ParentNotExist
        ));
    }
}
