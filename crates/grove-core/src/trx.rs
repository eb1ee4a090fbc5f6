use serde::{Deserialize, Serialize};

use crate::types::{GroupId, SignPublicKey, Signature, TimestampSecs, TrxId};

/// The eight trx type codes (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrxType {
    Post,
    Auth,
    Announce,
    Producer,
    Schema,
    ReqBlockForward,
    ReqBlockBackward,
    ReqBlockResp,
    BlockProduced,
}

/// A unit of replicated content (spec §3).
///
/// `data` carries the opaque, encrypted payload. Which encryption rule applies
/// is determined by `(trx_type, group.encrypt_type)` — see
/// `grove_chain::encryption_rule_for`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trx {
    pub trx_id: TrxId,
    pub trx_type: TrxType,
    pub group_id: GroupId,
    pub sender_pub_key: SignPublicKey,
    pub data: Vec<u8>,
    pub timestamp: TimestampSecs,
    /// Default `timestamp + DEFAULT_TRX_EXPIRATION_SECS` (configurable, spec §9).
    pub expired: TimestampSecs,
    pub version: String,
    pub resend_count: u32,
    pub sender_sig: Signature,
}

/// The fields covered by `sender_sig` — everything preceding it (spec §3).
#[derive(Serialize)]
struct TrxBody<'a> {
    trx_id: &'a TrxId,
    trx_type: &'a TrxType,
    group_id: &'a GroupId,
    sender_pub_key: &'a SignPublicKey,
    data: &'a [u8],
    timestamp: TimestampSecs,
    expired: TimestampSecs,
    version: &'a str,
    resend_count: u32,
}

impl Trx {
    /// Canonical bytes covered by the sender's signature.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let body = TrxBody {
            trx_id: &self.trx_id,
            trx_type: &self.trx_type,
            group_id: &self.group_id,
            sender_pub_key: &self.sender_pub_key,
            data: &self.data,
            timestamp: self.timestamp,
            expired: self.expired,
            version: &self.version,
            resend_count: self.resend_count,
        };
        bincode::serialize(&body).expect("trx body serialization is infallible")
    }

    pub fn is_expired(&self, now: TimestampSecs) -> bool {
        now > self.expired
    }
}
