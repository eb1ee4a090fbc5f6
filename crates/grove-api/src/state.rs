//! Shared application state handed to every handler via axum's `State`
//! extractor (spec §9 "no process-wide singletons" applies here too:
//! `AppState` is an ordinary value `grove-node` constructs once and hands
//! to `build_router`, not a static).

use std::sync::Arc;

use grove_group::{ContentReader, GroupMgr};
use tokio::sync::Notify;

/// Shared state held by every request handler.
pub struct AppState {
    pub group_mgr: Arc<GroupMgr>,
    /// The read side of the content index (`grove-index::Indexer`), reached
    /// only through its trait so this crate stays ignorant of the index
    /// implementation, same as `grove-group` itself.
    pub content_reader: Arc<dyn ContentReader>,
    /// Node-wide passphrase unlocked at startup (`GROVE_PASSWORD`), reused
    /// for every per-group key `create_group`/`join_group` mint or unlock.
    pub passphrase: String,
    pub peername: String,
    pub node_version: String,
    pub local_peer_id: String,
    pub protocol_version: String,
    /// Number of peers that share this node's protocol version right now.
    /// A closure rather than a direct `grove-p2p` type so this crate stays
    /// ignorant of the transport's internals — the same boundary discipline
    /// `grove-chain::ContentIndexer` applies to the content-index seam.
    pub peer_count_fn: Arc<dyn Fn() -> usize + Send + Sync>,
    /// Signalled by `GET /api/quit` (spec §6 "/api/quit sends SIGTERM").
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn peer_count(&self) -> usize {
        (self.peer_count_fn)()
    }
}

pub type SharedState = Arc<AppState>;
