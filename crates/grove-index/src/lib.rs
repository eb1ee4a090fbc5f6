//! grove-index
//!
//! Per-group content index (spec §4.10): watches committed POST trxs via
//! `grove_chain::ContentIndexer` and answers content queries via
//! `grove_group::ContentReader`, so `grove-chain` stays ignorant of the
//! read-side query shape and `grove-group` stays ignorant of how it's built.

pub mod indexer;

pub use indexer::Indexer;
