//! Consensus role selection (spec §4.7, §9).
//!
//! Only one concrete strategy (`Poa`, whitelist-of-producers) is live, but
//! the role is kept as a sum type rather than baked directly into `Chain`
//! so an alternate strategy could be slotted in later without touching the
//! commit algorithm (design note: "keep the abstraction as a sum of role
//! variants").

use std::sync::Mutex;

use grove_core::trx::Trx;

/// Pending trxs a producer has accepted but not yet packed into a block.
pub struct ProducerState {
    pub pending: Mutex<Vec<Trx>>,
}

impl ProducerState {
    pub fn new() -> Self {
        Self { pending: Mutex::new(Vec::new()) }
    }
}

impl Default for ProducerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Which roles this node holds for a group (spec §4.7 "Role selection").
/// Every node is a User; it is additionally a Producer iff its group
/// user-signing public key is present in the current producer pool.
pub enum ChainRole {
    User,
    UserAndProducer(ProducerState),
}

impl ChainRole {
    pub fn is_producer(&self) -> bool {
        matches!(self, ChainRole::UserAndProducer(_))
    }
}
