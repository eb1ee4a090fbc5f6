//! The index key convention is `cnt_grp-<groupId>_<seq>_<sender>:<trxId>`
//! (spec §4.10), zero-padded sequence numbers so a lexicographic prefix scan
//! of the generic meta tree yields insertion order directly.

use std::collections::HashSet;
use std::sync::Arc;

use grove_chain::ContentIndexer;
use grove_core::constants::CNT_PREFIX;
use grove_core::error::{GroveError, GroveResult};
use grove_core::trx::Trx;
use grove_core::types::{BlockId, GroupId, SignPublicKey, TrxId};
use grove_group::ContentReader;
use grove_storage::StorageDb;

fn seq_counter_name(group_id: &GroupId) -> String {
    format!("post_seq_{group_id}")
}

fn index_prefix(group_id: &GroupId) -> String {
    format!("{CNT_PREFIX}_grp-{group_id}_")
}

fn index_key(group_id: &GroupId, seq: u64, sender_hex: &str, trx_hex: &str) -> String {
    format!("{}{seq:020}_{sender_hex}:{trx_hex}", index_prefix(group_id))
}

fn highest_key(group_id: &GroupId) -> String {
    format!("{CNT_PREFIX}_grp-{group_id}_highest")
}

/// Watches committed POST trxs for every group and answers content queries
/// against the resulting index (spec §4.10).
pub struct Indexer {
    storage: Arc<StorageDb>,
}

impl Indexer {
    pub fn new(storage: Arc<StorageDb>) -> Self {
        Self { storage }
    }

    /// The per-group block id the index has resumed from, for a caller that
    /// wants to confirm the index is caught up with the chain's own head.
    pub fn highest_block_id(&self, group_id: &GroupId) -> GroveResult<Option<BlockId>> {
        let bytes = self.storage.get_meta(&highest_key(group_id))?;
        Ok(bytes.map(|b| {
            let mut arr = [0u8; 16];
            arr.copy_from_slice(&b);
            BlockId(arr)
        }))
    }
}

impl ContentIndexer for Indexer {
    fn index_post(&self, group_id: &GroupId, block_id: BlockId, trx: &Trx) -> GroveResult<()> {
        let seq = self.storage.next_seq(&seq_counter_name(group_id))?;
        let sender_hex = hex::encode(&trx.sender_pub_key.0);
        let trx_hex = trx.trx_id.to_hex();
        let key = index_key(group_id, seq, &sender_hex, &trx_hex);
        self.storage.put_meta(&key, &trx.trx_id.0)?;
        self.storage.put_meta(&highest_key(group_id), &block_id.0)
    }
}

impl ContentReader for Indexer {
    fn query_content(
        &self,
        group_id: &GroupId,
        senders: &[SignPublicKey],
        start_trx: Option<TrxId>,
        num: usize,
        reverse: bool,
    ) -> GroveResult<Vec<TrxId>> {
        let mut entries = self.storage.scan_meta_prefix(&index_prefix(group_id))?;
        entries.retain(|(k, _)| !k.ends_with("_highest"));
        if reverse {
            entries.reverse();
        }

        let sender_filter: Option<HashSet<String>> = if senders.is_empty() {
            None
        } else {
            Some(senders.iter().map(|s| hex::encode(&s.0)).collect())
        };
        let start_hex = start_trx.map(|t| t.to_hex());

        let mut skipping = start_hex.is_some();
        let mut out = Vec::with_capacity(num);
        for (key, _) in entries {
            let (sender_hex, trx_hex) = parse_key(&key)?;
            if skipping {
                if Some(trx_hex) == start_hex.as_deref() {
                    skipping = false;
                }
                continue;
            }
            if let Some(filter) = &sender_filter {
                if !filter.contains(sender_hex) {
                    continue;
                }
            }
            out.push(TrxId::from_hex(trx_hex).map_err(|e| GroveError::Other(e.to_string()))?);
            if out.len() >= num {
                break;
            }
        }
        Ok(out)
    }
}

/// Split `cnt_grp-<groupId>_<seq>_<sender>:<trxId>` into `(sender, trxId)`.
fn parse_key(key: &str) -> GroveResult<(&str, &str)> {
    let (_, tail) = key
        .rsplit_once('_')
        .ok_or_else(|| GroveError::Other(format!("malformed index key: {key}")))?;
    tail.split_once(':')
        .ok_or_else(|| GroveError::Other(format!("malformed index key: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::trx::TrxType;
    use grove_core::types::Signature;

    fn new_storage() -> (tempfile::TempDir, Arc<StorageDb>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageDb::open(dir.path()).unwrap());
        (dir, storage)
    }

    fn post_trx(group_id: &GroupId, sender: &SignPublicKey) -> Trx {
        Trx {
            trx_id: TrxId::new_v4(),
            trx_type: TrxType::Post,
            group_id: group_id.clone(),
            sender_pub_key: sender.clone(),
            data: Vec::new(),
            timestamp: 0,
            expired: 300,
            version: "1".into(),
            resend_count: 0,
            sender_sig: Signature(Vec::new()),
        }
    }

    #[test]
    fn index_then_query_returns_insertion_order() {
        let (_dir, storage) = new_storage();
        let indexer = Indexer::new(storage);
        let group_id = GroupId::new_v4();
        let sender = SignPublicKey(vec![1, 2, 3]);

        let mut expected = Vec::new();
        for _ in 0..3 {
            let trx = post_trx(&group_id, &sender);
            expected.push(trx.trx_id);
            indexer.index_post(&group_id, BlockId::new_v4(), &trx).unwrap();
        }

        let got = indexer.query_content(&group_id, &[], None, 10, false).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn query_filters_by_sender() {
        let (_dir, storage) = new_storage();
        let indexer = Indexer::new(storage);
        let group_id = GroupId::new_v4();
        let alice = SignPublicKey(vec![1]);
        let bob = SignPublicKey(vec![2]);

        let alice_trx = post_trx(&group_id, &alice);
        indexer.index_post(&group_id, BlockId::new_v4(), &alice_trx).unwrap();
        let bob_trx = post_trx(&group_id, &bob);
        indexer.index_post(&group_id, BlockId::new_v4(), &bob_trx).unwrap();

        let got = indexer.query_content(&group_id, &[alice.clone()], None, 10, false).unwrap();
        assert_eq!(got, vec![alice_trx.trx_id]);
    }

    #[test]
    fn query_reverse_order() {
        let (_dir, storage) = new_storage();
        let indexer = Indexer::new(storage);
        let group_id = GroupId::new_v4();
        let sender = SignPublicKey(vec![9]);

        let first = post_trx(&group_id, &sender);
        indexer.index_post(&group_id, BlockId::new_v4(), &first).unwrap();
        let second = post_trx(&group_id, &sender);
        indexer.index_post(&group_id, BlockId::new_v4(), &second).unwrap();

        let got = indexer.query_content(&group_id, &[], None, 10, true).unwrap();
        assert_eq!(got, vec![second.trx_id, first.trx_id]);
    }
}
