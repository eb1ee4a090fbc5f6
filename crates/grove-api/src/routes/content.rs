//! `POST /api/v1/group/content` and `GET /api/v1/group/:group_id/content`
//! (spec §6). Posting wraps the raw bytes in the ActivityStreams-flavored
//! envelope the spec names (`{type: "Add", object: {type: "Note", content},
//! target: {type: "Group", id}}`); reading resolves the query through the
//! node's `ContentReader` and decrypts each matching trx.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use grove_core::error::GroveError;
use grove_core::types::{GroupId, TrxId};

use crate::dto::TrxDto;
use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct NoteObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct GroupTarget {
    #[serde(rename = "type")]
    pub target_type: String,
    pub id: String,
}

#[derive(Deserialize)]
pub struct PostContentRequest {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub object: NoteObject,
    pub target: GroupTarget,
}

#[derive(Serialize)]
pub struct PostContentResponse {
    pub trx_id: String,
}

pub async fn post_content(
    State(state): State<SharedState>,
    Json(body): Json<PostContentRequest>,
) -> Result<Json<PostContentResponse>, ApiError> {
    if body.activity_type != "Add" || body.object.object_type != "Note" || body.target.target_type != "Group" {
        return Err(ApiError(GroveError::Validation(
            "content activity must be {type: Add, object: {type: Note}, target: {type: Group}}".into(),
        )));
    }
    let group_id = GroupId(body.target.id);
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;

    let item = group.item();
    let recipients = vec![item.user_encrypt_pub_key.clone()];
    let trx = group.chain().post(body.object.content.as_bytes(), &recipients).await?;
    Ok(Json(PostContentResponse { trx_id: trx.trx_id.to_hex() }))
}

#[derive(Deserialize)]
pub struct ContentQuery {
    pub num: Option<usize>,
    pub starttrx: Option<String>,
    pub reverse: Option<bool>,
    pub filter: Option<String>,
}

#[derive(Serialize)]
pub struct ContentListResponse {
    pub trxs: Vec<TrxDto>,
}

pub async fn get_content(
    State(state): State<SharedState>,
    Path(group_id): Path<String>,
    Query(q): Query<ContentQuery>,
) -> Result<Json<ContentListResponse>, ApiError> {
    let group_id = GroupId(group_id);
    let group = state
        .group_mgr
        .get(&group_id)
        .await
        .ok_or_else(|| ApiError(GroveError::GroupNotFound(group_id.to_string())))?;

    let start_trx = q
        .starttrx
        .as_deref()
        .map(TrxId::from_hex)
        .transpose()
        .map_err(|e| ApiError(GroveError::Validation(format!("invalid starttrx: {e}"))))?;

    let senders = parse_filter_senders(q.filter.as_deref())?;
    let num = q.num.unwrap_or(20);
    let reverse = q.reverse.unwrap_or(false);

    let items = group.get_group_content(state.content_reader.as_ref(), &senders, start_trx, num, reverse)?;
    let trxs = items.iter().map(|(trx, plain)| TrxDto::from_decrypted(trx, plain)).collect();
    Ok(Json(ContentListResponse { trxs }))
}

/// `filter` is a comma-separated list of hex sign pubkeys restricting the
/// query to those senders; absent or empty means no restriction.
fn parse_filter_senders(filter: Option<&str>) -> Result<Vec<grove_core::types::SignPublicKey>, ApiError> {
    let Some(filter) = filter else { return Ok(Vec::new()) };
    if filter.is_empty() {
        return Ok(Vec::new());
    }
    filter
        .split(',')
        .map(|s| {
            hex::decode(s.trim())
                .map(grove_core::types::SignPublicKey)
                .map_err(|e| ApiError(GroveError::Validation(format!("invalid hex in filter: {e}"))))
        })
        .collect()
}
