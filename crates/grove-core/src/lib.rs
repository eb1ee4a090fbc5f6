pub mod block;
pub mod constants;
pub mod error;
pub mod membership;
pub mod trx;
pub mod types;

pub use block::Block;
pub use constants::*;
pub use error::{GroveError, GroveResult};
pub use membership::{
    AnnounceItem, AnnounceResult, AnnounceType, ConsensusType, DenyUserItem, GroupEncryptType,
    GroupItem, ProducerAction, ProducerItem, SchemaItem, UpsertAction,
};
pub use trx::{Trx, TrxType};
pub use types::*;
