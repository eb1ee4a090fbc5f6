//! grove-chain
//!
//! Per-group chain replication: the canonical codec, the encryption-rule
//! table shared by sender and receiver, the transaction manager, the
//! producer/user role split, the sync state machine, and the `Chain` engine
//! tying them together (spec §4.5-§4.8).

pub mod chain;
pub mod codec;
pub mod encryption;
pub mod role;
pub mod syncer;
pub mod trxmgr;
pub mod wire;

pub use chain::{Chain, ContentIndexer};
pub use encryption::{encryption_rule_for, EncryptionRule};
pub use role::ChainRole;
pub use syncer::{RetryOutcome, Syncer, SyncerState};
pub use trxmgr::TrxMgr;
