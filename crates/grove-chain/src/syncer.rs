//! Per-group sync state machine (spec §4.8).
//!
//! `IsSyncerReady` in the source returns `true` when the syncer is *busy* —
//! some call sites invert the meaning. This implementation exposes
//! `is_idle()` and treats "ready to accept posts" as "syncer is IDLE"
//! (DESIGN.md Open Question #6).

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use grove_core::error::{GroveError, GroveResult};
use grove_core::types::{BlockId, SignPublicKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncerState {
    Idle,
    SyncingForward,
    SyncingBackward,
    SyncFailed,
}

/// What the retry timer's owner should do after `on_retry_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Reissue,
    Failed,
}

struct Inner {
    state: SyncerState,
    retry_count: u32,
    next_nonce: u64,
    current_nonce: Option<u64>,
    /// Producers that responded `BLOCK_NOT_FOUND` to the current request;
    /// cleared whenever a new sync episode starts.
    exhausted: HashSet<Vec<u8>>,
    target_block_id: Option<BlockId>,
}

/// Drives one group's sync episodes. Owns no network or storage handles —
/// `Chain` calls in with responses and producer-pool snapshots.
pub struct Syncer {
    inner: Mutex<Inner>,
    pub retry_interval: Duration,
    pub retry_cap: u32,
}

impl Syncer {
    pub fn new(retry_interval_secs: u64, retry_cap: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SyncerState::Idle,
                retry_count: 0,
                next_nonce: 0,
                current_nonce: None,
                exhausted: HashSet::new(),
                target_block_id: None,
            }),
            retry_interval: Duration::from_secs(retry_interval_secs),
            retry_cap,
        }
    }

    pub fn state(&self) -> SyncerState {
        self.inner.lock().unwrap().state
    }

    /// "Ready to accept posts" == syncer is IDLE (spec §9 correction).
    pub fn is_idle(&self) -> bool {
        self.state() == SyncerState::Idle
    }

    fn fresh_nonce(inner: &mut Inner) -> u64 {
        let n = inner.next_nonce;
        inner.next_nonce += 1;
        n
    }

    /// `StartSync()` (spec §4.8): IDLE -> SYNCING_FORWARD for the given head.
    /// Returns the nonce to stamp on the outgoing `REQ_BLOCK_FORWARD`.
    pub fn start_sync(&self, head: BlockId) -> GroveResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SyncerState::Idle {
            return Err(GroveError::GroupAlreadyInSyncing);
        }
        inner.state = SyncerState::SyncingForward;
        inner.retry_count = 0;
        inner.exhausted.clear();
        inner.target_block_id = Some(head);
        let nonce = Self::fresh_nonce(&mut inner);
        inner.current_nonce = Some(nonce);
        Ok(nonce)
    }

    /// `SyncBackward(block)` (spec §4.8): entered only from the commit path
    /// when a block's parent is unknown.
    pub fn sync_backward(&self, missing_block_id: BlockId) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.state = SyncerState::SyncingBackward;
        inner.retry_count = 0;
        inner.exhausted.clear();
        inner.target_block_id = Some(missing_block_id);
        let nonce = Self::fresh_nonce(&mut inner);
        inner.current_nonce = Some(nonce);
        nonce
    }

    /// `StopSync()` (spec §4.8): cancel any in-flight episode, return to IDLE.
    pub fn stop_sync(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = SyncerState::Idle;
        inner.current_nonce = None;
        inner.target_block_id = None;
        inner.exhausted.clear();
    }

    pub fn target_block_id(&self) -> Option<BlockId> {
        self.inner.lock().unwrap().target_block_id
    }

    pub fn current_nonce(&self) -> Option<u64> {
        self.inner.lock().unwrap().current_nonce
    }

    /// Mark `producer` as exhausted (it answered `BLOCK_NOT_FOUND`). If every
    /// producer in `known_producers` is now exhausted, fall back to IDLE.
    pub fn mark_exhausted(&self, producer: &SignPublicKey, known_producers: &[SignPublicKey]) {
        let mut inner = self.inner.lock().unwrap();
        inner.exhausted.insert(producer.0.clone());
        if known_producers
            .iter()
            .all(|p| inner.exhausted.contains(&p.0))
        {
            inner.state = SyncerState::Idle;
            inner.current_nonce = None;
            inner.target_block_id = None;
        }
    }

    /// Advance the sync target forward after successfully committing a block.
    pub fn advance_forward(&self, new_head: BlockId) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.state = SyncerState::SyncingForward;
        inner.retry_count = 0;
        inner.target_block_id = Some(new_head);
        let nonce = Self::fresh_nonce(&mut inner);
        inner.current_nonce = Some(nonce);
        nonce
    }

    /// Called on retry-timer fire. Returns `Reissue` (caller resends the
    /// current request) or `Failed` (caller transitions the group to
    /// `SYNC_FAILED`, terminal until operator intervention).
    pub fn on_retry_timeout(&self) -> RetryOutcome {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SyncerState::Idle || inner.state == SyncerState::SyncFailed {
            return RetryOutcome::Reissue;
        }
        inner.retry_count += 1;
        if inner.retry_count >= self.retry_cap {
            inner.state = SyncerState::SyncFailed;
            RetryOutcome::Failed
        } else {
            let nonce = Self::fresh_nonce(&mut inner);
            inner.current_nonce = Some(nonce);
            RetryOutcome::Reissue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_sync_rejects_when_not_idle() {
        let s = Syncer::new(10, 5);
        s.start_sync(BlockId::EMPTY).unwrap();
        assert!(matches!(
            s.start_sync(BlockId::EMPTY).unwrap_err(),
            GroveError::GroupAlreadyInSyncing
        ));
    }

    #[test]
    fn retry_cap_transitions_to_failed() {
        let s = Syncer::new(10, 2);
        s.start_sync(BlockId::EMPTY).unwrap();
        assert_eq!(s.on_retry_timeout(), RetryOutcome::Reissue);
        assert_eq!(s.on_retry_timeout(), RetryOutcome::Failed);
        assert_eq!(s.state(), SyncerState::SyncFailed);
    }

    #[test]
    fn all_producers_exhausted_returns_to_idle() {
        let s = Syncer::new(10, 5);
        s.start_sync(BlockId::EMPTY).unwrap();
        let p = SignPublicKey(vec![1, 2, 3]);
        s.mark_exhausted(&p, std::slice::from_ref(&p));
        assert!(s.is_idle());
    }

    #[test]
    fn stop_sync_resets_to_idle() {
        let s = Syncer::new(10, 5);
        s.start_sync(BlockId::EMPTY).unwrap();
        s.stop_sync();
        assert!(s.is_idle());
    }
}
