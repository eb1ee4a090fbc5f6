//! Per-channel transaction manager (spec §4.6). Each group runs two:
//! a user-channel TrxMgr and a producer-channel TrxMgr, kept as distinct
//! named fields on `Chain` rather than a map keyed by channel (DESIGN.md
//! Open Question #4 — do not replicate the source's key-collision bug).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use grove_core::constants::OBJECT_SIZE_LIMIT;
use grove_core::error::{GroveError, GroveResult};
use grove_core::membership::{AnnounceItem, DenyUserItem, GroupItem, ProducerItem, SchemaItem};
use grove_core::trx::{Trx, TrxType};
use grove_core::types::{BlockId, EncryptPublicKey, SignPublicKey, TrxId};
use grove_keystore::Keystore;
use grove_p2p::{Channel, GossipPackage, P2pCommand, Package};
use tokio::sync::mpsc;
use tracing::debug;

use crate::encryption::{encryption_rule_for, EncryptionRule};
use crate::wire::{BlockProducedPayload, ReqBlockPayload, ReqBlockRespPayload};

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub struct TrxMgr {
    channel: Channel,
    keystore: Arc<Keystore>,
    sign_key_name: String,
    version: String,
    expiration_secs: i64,
    p2p_tx: mpsc::Sender<P2pCommand>,
}

impl TrxMgr {
    pub fn new(
        channel: Channel,
        keystore: Arc<Keystore>,
        sign_key_name: String,
        version: String,
        expiration_secs: i64,
        p2p_tx: mpsc::Sender<P2pCommand>,
    ) -> Self {
        Self {
            channel,
            keystore,
            sign_key_name,
            version,
            expiration_secs,
            p2p_tx,
        }
    }

    /// `CreateTrx(type, payload)` (spec §4.6): fresh id, this node's group
    /// sign key as sender, timestamps, encryption per `encryption_rule_for`,
    /// signed over `signable_bytes`.
    pub fn create_trx(
        &self,
        trx_type: TrxType,
        group: &GroupItem,
        recipients: &[EncryptPublicKey],
        plain_payload: &[u8],
    ) -> GroveResult<Trx> {
        let data = match encryption_rule_for(trx_type, group.encrypt_type) {
            EncryptionRule::Symmetric => grove_crypto::aes_encrypt(plain_payload, &group.cipher_key)
                .map_err(|e| GroveError::Other(e.to_string()))?,
            EncryptionRule::AsymmetricToApprovedUsers => {
                self.keystore.encrypt_to(recipients, plain_payload)?
            }
        };

        let now = now_secs();
        let mut trx = Trx {
            trx_id: TrxId::new_v4(),
            trx_type,
            group_id: group.group_id.clone(),
            sender_pub_key: group.user_sign_pub_key.clone(),
            data,
            timestamp: now,
            expired: now + self.expiration_secs,
            version: self.version.clone(),
            resend_count: 0,
            sender_sig: grove_core::types::Signature(Vec::new()),
        };
        let sig = self
            .keystore
            .sign_by_key_name(&self.sign_key_name, &trx.signable_bytes())?;
        trx.sender_sig = sig;
        Ok(trx)
    }

    /// `VerifyTrx(trx) -> bool` (spec §4.6): verify `sender_sig` over
    /// `signable_bytes` under the declared `sender_pub_key`.
    pub fn verify_trx(&self, trx: &Trx) -> bool {
        grove_crypto::verify(&trx.sender_pub_key, &trx.signable_bytes(), &trx.sender_sig).is_ok()
    }

    async fn publish(&self, group: &GroupItem, package: Package) -> GroveResult<()> {
        let gossip = GossipPackage {
            group_id: group.group_id.clone(),
            channel: self.channel,
            package,
        };
        self.p2p_tx
            .send(P2pCommand::Publish(gossip))
            .await
            .map_err(|e| GroveError::Other(format!("p2p publish channel closed: {e}")))
    }

    async fn create_and_publish(
        &self,
        trx_type: TrxType,
        group: &GroupItem,
        recipients: &[EncryptPublicKey],
        plain_payload: &[u8],
    ) -> GroveResult<Trx> {
        let trx = self.create_trx(trx_type, group, recipients, plain_payload)?;
        self.publish(group, Package::Trx(trx.clone())).await?;
        Ok(trx)
    }

    /// `PostAny(content)` (spec §4.5/§4.6): reject content over the 200 KiB
    /// object size limit before ever touching the network.
    pub async fn post_any(
        &self,
        group: &GroupItem,
        content: &[u8],
        recipients: &[EncryptPublicKey],
    ) -> GroveResult<Trx> {
        if content.len() > OBJECT_SIZE_LIMIT {
            return Err(GroveError::PayloadTooLarge {
                limit: OBJECT_SIZE_LIMIT,
                got: content.len(),
            });
        }
        self.create_and_publish(TrxType::Post, group, recipients, content)
            .await
    }

    pub async fn send_announce_trx(&self, group: &GroupItem, item: &AnnounceItem) -> GroveResult<Trx> {
        let payload = bincode::serialize(item).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::Announce, group, &[], &payload).await
    }

    pub async fn send_producer_trx(&self, group: &GroupItem, item: &ProducerItem) -> GroveResult<Trx> {
        let payload = bincode::serialize(item).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::Producer, group, &[], &payload).await
    }

    pub async fn send_deny_user_trx(&self, group: &GroupItem, item: &DenyUserItem) -> GroveResult<Trx> {
        let payload = bincode::serialize(item).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::Auth, group, &[], &payload).await
    }

    pub async fn send_schema_trx(&self, group: &GroupItem, item: &SchemaItem) -> GroveResult<Trx> {
        let payload = bincode::serialize(item).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::Schema, group, &[], &payload).await
    }

    pub async fn send_req_block_forward_trx(
        &self,
        group: &GroupItem,
        block_id: BlockId,
        requester_pub_key: SignPublicKey,
        nonce: u64,
    ) -> GroveResult<Trx> {
        let payload = ReqBlockPayload { block_id, requester_pub_key, nonce };
        let bytes = bincode::serialize(&payload).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::ReqBlockForward, group, &[], &bytes).await
    }

    pub async fn send_req_block_backward_trx(
        &self,
        group: &GroupItem,
        block_id: BlockId,
        requester_pub_key: SignPublicKey,
        nonce: u64,
    ) -> GroveResult<Trx> {
        let payload = ReqBlockPayload { block_id, requester_pub_key, nonce };
        let bytes = bincode::serialize(&payload).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::ReqBlockBackward, group, &[], &bytes).await
    }

    pub async fn send_req_block_resp_trx(
        &self,
        group: &GroupItem,
        payload: &ReqBlockRespPayload,
    ) -> GroveResult<Trx> {
        let bytes = bincode::serialize(payload).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::ReqBlockResp, group, &[], &bytes).await
    }

    pub async fn send_block_produced_trx(
        &self,
        group: &GroupItem,
        block: &grove_core::block::Block,
    ) -> GroveResult<Trx> {
        let payload = BlockProducedPayload { block: block.clone() };
        let bytes = bincode::serialize(&payload).map_err(|e| GroveError::Serialization(e.to_string()))?;
        self.create_and_publish(TrxType::BlockProduced, group, &[], &bytes).await
    }

    /// `SendBlock(block)` (spec §4.6): publish a BLOCK package directly,
    /// bypassing the trx envelope (used by the producer-channel gossip of
    /// freshly minted blocks).
    pub async fn send_block(&self, group: &GroupItem, block: &grove_core::block::Block) -> GroveResult<()> {
        debug!(group = %group.group_id, block = %block.block_id, "publishing block");
        self.publish(group, Package::Block(block.clone())).await
    }

    /// Re-broadcast an already-signed trx unchanged (used to resend trimmed
    /// blocks' trxs after a fork resolution bumps `resend_count`; the caller
    /// re-signs before calling this, since `resend_count` is covered by the
    /// signature).
    pub async fn republish(&self, group: &GroupItem, trx: Trx) -> GroveResult<()> {
        self.publish(group, Package::Trx(trx)).await
    }
}
