//! `GET /api/v1/node` (spec §6).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct NodeInfoResponse {
    pub peername: String,
    pub peer_id: String,
    pub protocol_version: String,
    pub node_version: String,
    pub protocol_peers: usize,
    /// ONLINE iff at least one peer shares this node's protocol prefix.
    pub status: &'static str,
}

pub async fn get_node(State(state): State<SharedState>) -> Json<NodeInfoResponse> {
    let protocol_peers = state.peer_count();
    Json(NodeInfoResponse {
        peername: state.peername.clone(),
        peer_id: state.local_peer_id.clone(),
        protocol_version: state.protocol_version.clone(),
        node_version: state.node_version.clone(),
        protocol_peers,
        status: if protocol_peers > 0 { "ONLINE" } else { "OFFLINE" },
    })
}
