//! Route table assembly (spec §6 "EXTERNAL INTERFACES"), grounded on
//! `rishy2211-mlsnitch/api-gateway`'s `Router::new().route(...).with_state(...)`
//! layering.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::routes::{chain, content, group, node, quit};
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/node", get(node::get_node))
        .route("/api/v1/group", post(group::create_group).delete(group::delete_group))
        .route("/api/v1/group/join", post(group::join_group))
        .route("/api/v1/group/leave", post(group::leave_group))
        .route("/api/v1/group/content", post(content::post_content))
        .route("/api/v1/group/producer", post(group::change_producer))
        .route("/api/v1/group/announce", post(group::announce))
        .route("/api/v1/group/deniedlist", post(group::update_denied_list))
        .route("/api/v1/group/schema", post(group::upsert_schema))
        .route("/api/v1/group/{group_id}/startsync", post(group::start_sync))
        .route("/api/v1/group/{group_id}/content", get(content::get_content))
        .route("/api/v1/block/{group_id}/{block_id}", get(chain::get_block))
        .route("/api/v1/trx/{group_id}/{trx_id}", get(chain::get_trx))
        .route("/api/quit", get(quit::quit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
