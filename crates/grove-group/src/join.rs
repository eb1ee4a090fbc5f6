//! The join-request envelope a prospective member receives out of band (QR
//! code, invite link, …) and presents to `Group::join` (spec §4.9).
//!
//! Field order and the owner's covering signature mirror
//! `original_source/api/joingroup.go`'s verification buffer: genesis block
//! bytes, group id, group name, owner pubkey, consensus type, encryption
//! type, app key, cipher key.

use grove_core::block::Block;
use grove_core::membership::{ConsensusType, GroupEncryptType};
use grove_core::types::{CipherKey, GroupId, SignPublicKey, Signature};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinPayload {
    pub genesis_block: Block,
    pub group_id: GroupId,
    pub group_name: String,
    pub owner_pub_key: SignPublicKey,
    pub consensus_type: ConsensusType,
    pub encrypt_type: GroupEncryptType,
    pub cipher_key: CipherKey,
    pub app_key: String,
    /// The group owner's signature over `signable_bytes()`.
    pub signature: Signature,
}

/// The fields covered by `owner`'s signature — everything but the signature
/// itself.
#[derive(Serialize)]
struct JoinPayloadBody<'a> {
    genesis_block: &'a Block,
    group_id: &'a GroupId,
    group_name: &'a str,
    owner_pub_key: &'a SignPublicKey,
    consensus_type: ConsensusType,
    encrypt_type: GroupEncryptType,
    cipher_key: &'a CipherKey,
    app_key: &'a str,
}

impl JoinPayload {
    pub fn signable_bytes(&self) -> Vec<u8> {
        let body = JoinPayloadBody {
            genesis_block: &self.genesis_block,
            group_id: &self.group_id,
            group_name: &self.group_name,
            owner_pub_key: &self.owner_pub_key,
            consensus_type: self.consensus_type,
            encrypt_type: self.encrypt_type,
            cipher_key: &self.cipher_key,
            app_key: &self.app_key,
        };
        bincode::serialize(&body).expect("join payload body serialization is infallible")
    }
}
