//! `Group` operations (spec §4.9): create, join, leave, delete, start sync,
//! and content query. Grounded on `original_source/chain/group.go`'s minimal
//! `{Item, ChainCtx}` shape and the five `original_source/api/*.go` handlers
//! for the exact lifecycle steps, generalized into owned Rust methods
//! instead of package-level functions operating on a global `GroupMgr`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use grove_chain::{Chain, ContentIndexer};
use grove_core::block::Block;
use grove_core::error::{GroveError, GroveResult};
use grove_core::membership::{ConsensusType, GroupEncryptType, GroupItem, ProducerAction, ProducerItem};
use grove_core::types::{
    BlockId, CipherKey, Digest32, EncryptPublicKey, GroupId, Signature, SignPublicKey, TrxId,
};
use grove_core::trx::Trx;
use grove_keystore::{KeyType, Keystore};
use grove_p2p::P2pCommand;
use grove_storage::{BlockChunk, StorageDb};
use rand::RngCore;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::join::JoinPayload;

const NAME_MIN_LEN: usize = 5;
const NAME_MAX_LEN: usize = 20;

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn validate_len(field: &str, value: &str) -> GroveResult<()> {
    if value.len() < NAME_MIN_LEN || value.len() > NAME_MAX_LEN {
        return Err(GroveError::Validation(format!(
            "{field} must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters, got {}",
            value.len()
        )));
    }
    Ok(())
}

fn random_cipher_key() -> CipherKey {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    CipherKey(bytes)
}

/// Create the named key if it is not already present, otherwise reuse it
/// (DESIGN.md Open Question #5 — the inverted source check is not
/// replicated).
fn get_or_create_sign_key(keystore: &Keystore, name: &str, passphrase: &str) -> GroveResult<SignPublicKey> {
    let hex_pub = if keystore.key_exists(name) {
        let pubkey = keystore.get_encoded_pubkey(name)?;
        keystore.unlock(name, passphrase)?;
        pubkey
    } else {
        keystore.new_key(name, KeyType::Sign, passphrase)?
    };
    Ok(SignPublicKey(hex::decode(hex_pub).map_err(|e| GroveError::Other(e.to_string()))?))
}

fn get_or_create_encrypt_key(keystore: &Keystore, name: &str, passphrase: &str) -> GroveResult<EncryptPublicKey> {
    let hex_pub = if keystore.key_exists(name) {
        let pubkey = keystore.get_encoded_pubkey(name)?;
        keystore.unlock(name, passphrase)?;
        pubkey
    } else {
        keystore.new_key(name, KeyType::Encrypt, passphrase)?
    };
    Ok(EncryptPublicKey(hex::decode(hex_pub).map_err(|e| GroveError::Other(e.to_string()))?))
}

/// The fields covered by a create/join result's trailing signature.
#[derive(Serialize)]
struct ResultBody<'a> {
    group_id: &'a GroupId,
    group_name: &'a str,
    owner_pub_key: &'a SignPublicKey,
    consensus_type: ConsensusType,
    encrypt_type: GroupEncryptType,
    app_key: &'a str,
    cipher_key: &'a CipherKey,
}

fn sign_membership_result(
    keystore: &Keystore,
    key_name: &str,
    group_id: &GroupId,
    group_name: &str,
    owner_pub_key: &SignPublicKey,
    consensus_type: ConsensusType,
    encrypt_type: GroupEncryptType,
    app_key: &str,
    cipher_key: &CipherKey,
) -> GroveResult<Signature> {
    let body = ResultBody {
        group_id,
        group_name,
        owner_pub_key,
        consensus_type,
        encrypt_type,
        app_key,
        cipher_key,
    };
    let bytes = bincode::serialize(&body).expect("result body serialization is infallible");
    let hash = grove_crypto::hash(&bytes);
    keystore.sign_by_key_name(key_name, &hash.0)
}

fn sign_teardown(keystore: &Keystore, key_name: &str, sign_pub_key: &SignPublicKey, group_id: &GroupId) -> GroveResult<Signature> {
    let mut buf = sign_pub_key.0.clone();
    buf.extend_from_slice(group_id.as_str().as_bytes());
    let hash = grove_crypto::hash(&buf);
    keystore.sign_by_key_name(key_name, &hash.0)
}

pub struct CreateGroupParams {
    pub group_name: String,
    pub consensus_type: ConsensusType,
    pub encrypt_type: GroupEncryptType,
    pub app_key: String,
}

pub struct CreateGroupResult {
    pub group_id: GroupId,
    pub group_name: String,
    pub genesis_block: Block,
    pub owner_pub_key: SignPublicKey,
    pub owner_encrypt_pub_key: EncryptPublicKey,
    pub consensus_type: ConsensusType,
    pub encrypt_type: GroupEncryptType,
    pub cipher_key: CipherKey,
    pub app_key: String,
    pub signature: Signature,
}

pub struct JoinGroupResult {
    pub group_id: GroupId,
    pub group_name: String,
    pub owner_pub_key: SignPublicKey,
    pub user_pub_key: SignPublicKey,
    pub user_encrypt_pub_key: EncryptPublicKey,
    pub consensus_type: ConsensusType,
    pub encrypt_type: GroupEncryptType,
    pub cipher_key: CipherKey,
    pub app_key: String,
    pub signature: Signature,
}

pub struct LeaveGroupResult {
    pub group_id: GroupId,
    pub signature: Signature,
}

pub struct RmGroupResult {
    pub group_id: GroupId,
    pub owner_pub_key: SignPublicKey,
    pub signature: Signature,
}

/// Narrow capability `Group::get_group_content` calls into to resolve a
/// content query to an ordered list of trx ids, implemented by `grove-index`
/// (spec §4.10) — the same transport-decoupling discipline as
/// `grove_chain::ContentIndexer`.
pub trait ContentReader: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn query_content(
        &self,
        group_id: &GroupId,
        senders: &[SignPublicKey],
        start_trx: Option<TrxId>,
        num: usize,
        reverse: bool,
    ) -> GroveResult<Vec<TrxId>>;
}

/// One joined group: its replication engine plus a handle on the shared
/// storage needed for content lookups the chain engine itself doesn't do.
pub struct Group {
    chain: Arc<Chain>,
    storage: Arc<StorageDb>,
}

impl Group {
    pub(crate) fn new(chain: Arc<Chain>, storage: Arc<StorageDb>) -> Self {
        Self { chain, storage }
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn group_id(&self) -> GroupId {
        self.chain.group().group_id.clone()
    }

    pub fn item(&self) -> GroupItem {
        self.chain.group()
    }

    pub fn is_owner(&self, sign_pub_key: &SignPublicKey) -> bool {
        self.chain.group().owner_pub_key == *sign_pub_key
    }

    pub fn key_names(group_id: &GroupId) -> (String, String) {
        (format!("{group_id}:sign"), format!("{group_id}:encrypt"))
    }

    /// `Create(params)` (spec §4.9): fresh group id, per-group sign/encrypt
    /// keys, a fresh cipher key, and a self-signed genesis block; the owner
    /// is registered as the first producer.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        storage: Arc<StorageDb>,
        keystore: Arc<Keystore>,
        p2p_tx: mpsc::Sender<P2pCommand>,
        version: String,
        expiration_secs: i64,
        params: CreateGroupParams,
        passphrase: &str,
        indexer: Option<Arc<dyn ContentIndexer>>,
    ) -> GroveResult<(Self, CreateGroupResult)> {
        validate_len("group_name", &params.group_name)?;
        validate_len("app_key", &params.app_key)?;
        if !matches!(params.consensus_type, ConsensusType::Poa) {
            return Err(GroveError::UnsupportedConsensusType("only poa is supported".into()));
        }

        let group_id = GroupId::new_v4();
        let (sign_key_name, encrypt_key_name) = Self::key_names(&group_id);
        let owner_pub_key = get_or_create_sign_key(&keystore, &sign_key_name, passphrase)?;
        let owner_encrypt_pub_key = get_or_create_encrypt_key(&keystore, &encrypt_key_name, passphrase)?;
        let cipher_key = random_cipher_key();

        let mut genesis = Block {
            block_id: BlockId::new_v4(),
            group_id: group_id.clone(),
            prev_block_id: BlockId::EMPTY,
            prev_hash: Digest32::ZERO,
            trxs: Vec::new(),
            producer_pub_key: owner_pub_key.clone(),
            timestamp: now_secs(),
            hash: Digest32::ZERO,
            signature: Signature(Vec::new()),
        };
        genesis.hash = grove_chain::codec::hash_block(&genesis);
        genesis.signature = keystore.sign_by_key_name(&sign_key_name, &genesis.hash.0)?;

        let item = GroupItem {
            group_id: group_id.clone(),
            group_name: params.group_name.clone(),
            genesis_block: genesis.clone(),
            owner_pub_key: owner_pub_key.clone(),
            user_sign_pub_key: owner_pub_key.clone(),
            user_encrypt_pub_key: owner_encrypt_pub_key.clone(),
            cipher_key: cipher_key.clone(),
            app_key: params.app_key.clone(),
            highest_block_id: genesis.block_id,
            highest_height: 0,
            consensus_type: params.consensus_type,
            encrypt_type: params.encrypt_type,
            last_update: now_secs(),
        };

        storage.add_group(&item)?;
        storage.add_genesis_block(&group_id, BlockChunk::genesis(genesis.clone()))?;
        storage.put_producer(&ProducerItem {
            group_id: group_id.clone(),
            producer_pub_key: owner_pub_key.clone(),
            action: ProducerAction::Add,
            blocks_produced: 0,
        })?;

        let chain = Arc::new(Chain::new(
            storage.clone(),
            keystore.clone(),
            item,
            sign_key_name.clone(),
            encrypt_key_name,
            version,
            expiration_secs,
            p2p_tx,
            indexer,
        )?);

        let signature = sign_membership_result(
            &keystore,
            &sign_key_name,
            &group_id,
            &params.group_name,
            &owner_pub_key,
            params.consensus_type,
            params.encrypt_type,
            &params.app_key,
            &cipher_key,
        )?;

        let result = CreateGroupResult {
            group_id,
            group_name: params.group_name,
            genesis_block: genesis,
            owner_pub_key,
            owner_encrypt_pub_key,
            consensus_type: params.consensus_type,
            encrypt_type: params.encrypt_type,
            cipher_key,
            app_key: params.app_key,
            signature,
        };

        Ok((Group::new(chain, storage), result))
    }

    /// `Join(joinPayload)` (spec §4.9): verify the owner's signature over
    /// the join payload, mint local per-group keys, persist the resulting
    /// `GroupItem`, and start sync.
    #[allow(clippy::too_many_arguments)]
    pub async fn join(
        storage: Arc<StorageDb>,
        keystore: Arc<Keystore>,
        p2p_tx: mpsc::Sender<P2pCommand>,
        version: String,
        expiration_secs: i64,
        payload: JoinPayload,
        passphrase: &str,
        indexer: Option<Arc<dyn ContentIndexer>>,
    ) -> GroveResult<(Self, JoinGroupResult)> {
        if storage.group_exists(&payload.group_id) {
            return Err(GroveError::GroupAlreadyExists);
        }
        let hash = grove_crypto::hash(&payload.signable_bytes());
        grove_crypto::verify(&payload.owner_pub_key, &hash.0, &payload.signature)
            .map_err(|_| GroveError::InvalidSignature)?;

        let (sign_key_name, encrypt_key_name) = Self::key_names(&payload.group_id);
        let user_pub_key = get_or_create_sign_key(&keystore, &sign_key_name, passphrase)?;
        let user_encrypt_pub_key = get_or_create_encrypt_key(&keystore, &encrypt_key_name, passphrase)?;

        let item = GroupItem {
            group_id: payload.group_id.clone(),
            group_name: payload.group_name.clone(),
            genesis_block: payload.genesis_block.clone(),
            owner_pub_key: payload.owner_pub_key.clone(),
            user_sign_pub_key: user_pub_key.clone(),
            user_encrypt_pub_key: user_encrypt_pub_key.clone(),
            cipher_key: payload.cipher_key.clone(),
            app_key: payload.app_key.clone(),
            highest_block_id: payload.genesis_block.block_id,
            highest_height: 0,
            consensus_type: payload.consensus_type,
            encrypt_type: payload.encrypt_type,
            last_update: now_secs(),
        };

        storage.add_group(&item)?;
        storage.add_genesis_block(&payload.group_id, BlockChunk::genesis(payload.genesis_block.clone()))?;

        let chain = Arc::new(Chain::new(
            storage.clone(),
            keystore.clone(),
            item,
            sign_key_name.clone(),
            encrypt_key_name,
            version,
            expiration_secs,
            p2p_tx,
            indexer,
        )?);

        let group = Group::new(chain, storage);
        group.start_sync().await?;

        let signature = sign_membership_result(
            &keystore,
            &sign_key_name,
            &payload.group_id,
            &payload.group_name,
            &payload.owner_pub_key,
            payload.consensus_type,
            payload.encrypt_type,
            &payload.app_key,
            &payload.cipher_key,
        )?;

        let result = JoinGroupResult {
            group_id: payload.group_id,
            group_name: payload.group_name,
            owner_pub_key: payload.owner_pub_key,
            user_pub_key,
            user_encrypt_pub_key,
            consensus_type: payload.consensus_type,
            encrypt_type: payload.encrypt_type,
            cipher_key: payload.cipher_key,
            app_key: payload.app_key,
            signature,
        };
        Ok((group, result))
    }

    /// `Leave()` (spec §4.9): only a non-owner may leave.
    pub fn leave(&self, keystore: &Keystore) -> GroveResult<LeaveGroupResult> {
        let group = self.chain.group();
        if group.owner_pub_key == group.user_sign_pub_key {
            return Err(GroveError::OwnerCannotLeave);
        }
        let (sign_key_name, _) = Self::key_names(&group.group_id);
        let signature = sign_teardown(keystore, &sign_key_name, &group.user_sign_pub_key, &group.group_id)?;
        Ok(LeaveGroupResult { group_id: group.group_id, signature })
    }

    /// `Delete()` (spec §4.9): only the owner; caller removes the group
    /// from the registry and storage afterward.
    pub fn delete(&self, keystore: &Keystore) -> GroveResult<RmGroupResult> {
        let group = self.chain.group();
        if group.owner_pub_key != group.user_sign_pub_key {
            return Err(GroveError::NotOwner);
        }
        let (sign_key_name, _) = Self::key_names(&group.group_id);
        let signature = sign_teardown(keystore, &sign_key_name, &group.user_sign_pub_key, &group.group_id)?;
        Ok(RmGroupResult {
            group_id: group.group_id,
            owner_pub_key: group.owner_pub_key,
            signature,
        })
    }

    /// `StartSync()` (spec §4.8): rejects with `GROUP_ALREADY_IN_SYNCING`
    /// when the syncer is not idle, rather than queueing or retrying.
    pub async fn start_sync(&self) -> GroveResult<()> {
        if !self.chain.syncer().is_idle() {
            return Err(GroveError::GroupAlreadyInSyncing);
        }
        self.chain.start_sync().await
    }

    /// Fetch a single committed block (spec §6 `GET /api/v1/block/:group_id/:block_id`).
    pub fn get_block(&self, block_id: &BlockId) -> GroveResult<Block> {
        let group_id = self.group_id();
        Ok(self.storage.get_block_chunk(&group_id, block_id)?.block)
    }

    /// Fetch a single committed trx and its decrypted payload (spec §6
    /// `GET /api/v1/trx/:group_id/:trx_id`).
    pub fn get_trx(&self, trx_id: &TrxId) -> GroveResult<(Trx, Vec<u8>)> {
        let group_id = self.group_id();
        let trx = self.storage.get_trx(&group_id, trx_id)?;
        let plain = self.chain.decrypt_post(&trx)?;
        Ok((trx, plain))
    }

    /// `GetGroupCtn(filter)` (spec §4.9/§4.10): resolve the query through a
    /// `ContentReader` (the `grove-index` crate), then fetch and decrypt
    /// each matching trx.
    #[allow(clippy::too_many_arguments)]
    pub fn get_group_content(
        &self,
        reader: &dyn ContentReader,
        senders: &[SignPublicKey],
        start_trx: Option<TrxId>,
        num: usize,
        reverse: bool,
    ) -> GroveResult<Vec<(Trx, Vec<u8>)>> {
        let group_id = self.group_id();
        let trx_ids = reader.query_content(&group_id, senders, start_trx, num, reverse)?;
        let mut out = Vec::with_capacity(trx_ids.len());
        for id in trx_ids {
            let trx = self.storage.get_trx(&group_id, &id)?;
            let plain = self.chain.decrypt_post(&trx)?;
            out.push((trx, plain));
        }
        Ok(out)
    }
}
